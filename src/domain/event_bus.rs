//! Topic-keyed publish/subscribe registry.
//!
//! [`EventBus`] holds the subscription table and nothing else. Delivery is
//! synchronous: [`EventBus::publish`] invokes every handler registered on
//! the exact topic, in registration order, before returning.
//!
//! The bus is constructed explicitly and passed to whoever needs it; clones
//! share one table. The table lock is held only while mutating it or while
//! taking a snapshot of a topic's handlers, never while a handler runs, so
//! handlers may subscribe and unsubscribe (themselves included) freely.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Deserialize;

use super::Topic;
use super::payload;
use crate::error::TelemetryError;

/// Callback invoked with the payload of every publish on its topic.
pub type Handler = Arc<dyn Fn(&serde_json::Value) -> anyhow::Result<()> + Send + Sync>;

/// Unique identifier of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct Registry {
    topics: HashMap<Topic, Vec<(SubscriptionId, Handler)>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("topic_count", &self.topics.len())
            .field(
                "subscription_count",
                &self.topics.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl Registry {
    fn remove(&mut self, topic: &Topic, id: SubscriptionId) -> bool {
        let Some(handlers) = self.topics.get_mut(topic) else {
            return false;
        };
        let Some(idx) = handlers.iter().position(|(sid, _)| *sid == id) else {
            return false;
        };
        handlers.remove(idx);
        if handlers.is_empty() {
            self.topics.remove(topic);
        }
        true
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // A handler never runs under this lock, so a poisoned table is still
    // structurally sound.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of one [`EventBus::publish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl Delivery {
    /// Total handlers invoked.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

impl std::ops::AddAssign for Delivery {
    fn add_assign(&mut self, rhs: Self) {
        self.delivered += rhs.delivered;
        self.failed += rhs.failed;
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle does not unsubscribe; call
/// [`Subscription::unsubscribe`] or [`EventBus::unsubscribe`]. The handle
/// only holds a weak reference, so it never keeps the bus alive.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Returns the registration id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the topic this subscription listens on.
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Removes this registration. Returns `false` if it was already removed
    /// or the bus is gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = lock(&registry).remove(&self.topic, self.id);
        if removed {
            tracing::debug!(topic = %self.topic, subscription = %self.id, "unsubscribed");
        }
        removed
    }
}

/// Publish/subscribe registry keyed by [`Topic`].
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` on `topic`. Handlers on the same topic are called
    /// in registration order.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        let handler: Handler = Arc::new(handler);
        lock(&self.registry)
            .topics
            .entry(topic.clone())
            .or_default()
            .push((id, handler));
        tracing::debug!(topic = %topic, subscription = %id, "subscribed");
        Subscription {
            id,
            topic,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Removes a registration. Idempotent: returns `false` when the
    /// subscription was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        if !Weak::ptr_eq(&subscription.registry, &Arc::downgrade(&self.registry)) {
            return false;
        }
        subscription.unsubscribe()
    }

    /// Delivers `payload` to every handler currently subscribed to `topic`.
    ///
    /// The handler list is snapshotted first: subscriptions added or removed
    /// by a handler take effect from the next publish. A handler that
    /// returns an error or panics is logged and skipped; the remaining
    /// handlers still run.
    pub fn publish(&self, topic: &Topic, payload: &serde_json::Value) -> Delivery {
        let snapshot: Vec<(SubscriptionId, Handler)> = lock(&self.registry)
            .topics
            .get(topic)
            .map(|handlers| {
                handlers
                    .iter()
                    .map(|(id, h)| (*id, Arc::clone(h)))
                    .collect()
            })
            .unwrap_or_default();

        let mut delivery = Delivery::default();
        for (id, handler) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (*handler)(payload)));
            match handler_failure(outcome) {
                None => delivery.delivered += 1,
                Some(err) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        topic = %topic,
                        subscription = %id,
                        code = err.error_code(),
                        error = %err,
                        "subscriber handler failed"
                    );
                }
            }
        }
        delivery
    }

    /// Returns `true` if at least one handler listens on `topic`.
    #[must_use]
    pub fn has_subscribers(&self, topic: &Topic) -> bool {
        lock(&self.registry).topics.contains_key(topic)
    }

    /// Returns the total number of registrations across all topics.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        lock(&self.registry).topics.values().map(Vec::len).sum()
    }

    /// Returns the number of topics with at least one registration.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        lock(&self.registry).topics.len()
    }
}

/// Maps a caught handler outcome to the error it represents, if any.
///
/// Errors the handler raised as [`TelemetryError`] (payload decode failures
/// from [`typed`], for instance) keep their variant; anything else becomes
/// [`TelemetryError::Handler`].
fn handler_failure(outcome: std::thread::Result<anyhow::Result<()>>) -> Option<TelemetryError> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(
            err.downcast::<TelemetryError>()
                .unwrap_or_else(|other| TelemetryError::Handler(format!("{other:#}"))),
        ),
        Err(_) => Some(TelemetryError::HandlerPanicked),
    }
}

/// Wraps a typed callback into a bus handler.
///
/// The payload is decoded into `T` first; a payload that does not match is
/// reported as a handler failure.
pub fn typed<T, F>(handler: F) -> impl Fn(&serde_json::Value) -> anyhow::Result<()> + Send + Sync
where
    T: for<'de> Deserialize<'de>,
    F: Fn(T) -> anyhow::Result<()> + Send + Sync,
{
    move |value| {
        let decoded = payload::decode::<T>(value)?;
        handler(decoded)
    }
}
