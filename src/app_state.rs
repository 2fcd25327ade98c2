//! Shared application state injected into the diagnostics handlers.

use crate::domain::EventBus;
use crate::ws::dispatcher::DispatcherHandle;

/// Shared state available to all handlers via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Event bus the feed publishes on.
    pub event_bus: EventBus,
    /// Producer side of the dispatcher, used for its counters.
    pub dispatcher: DispatcherHandle,
}
