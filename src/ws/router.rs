//! Topic router: publishes each envelope on the topic(s) its family maps to.
//!
//! - `build:log:<id>` is published once, on its own topic.
//! - `build:update:<id>` is published on its own topic, then on the
//!   aggregate [`Topic::UpdateFeed`], with the same payload.
//! - Anything else is logged and dropped.

use crate::domain::topic::has_empty_build_id;
use crate::domain::{Delivery, Envelope, EventBus, Topic, TopicFamily};
use crate::error::TelemetryError;

/// What one [`TopicRouter::route`] call published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReport {
    /// Topics published to, in publish order.
    pub topics: Vec<Topic>,
    /// Handler outcomes summed over all publishes.
    pub delivery: Delivery,
}

/// Classifies envelopes and republishes them on an [`EventBus`].
#[derive(Debug, Clone)]
pub struct TopicRouter {
    bus: EventBus,
}

impl TopicRouter {
    /// Creates a router publishing on `bus`.
    #[must_use]
    pub const fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Returns the bus this router publishes on.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Returns the topics an envelope is published on, in order.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::EmptyBuildId`] for a bare family prefix and
    /// [`TelemetryError::UnknownTopic`] for any other unrecognized type.
    pub fn topics_for(envelope: &Envelope) -> Result<Vec<Topic>, TelemetryError> {
        match envelope.family() {
            TopicFamily::Log(id) => Ok(vec![Topic::BuildLog(id.clone())]),
            TopicFamily::Update(id) => Ok(vec![Topic::BuildUpdate(id.clone()), Topic::UpdateFeed]),
            TopicFamily::Unrecognized if has_empty_build_id(envelope.msg_type()) => {
                Err(TelemetryError::EmptyBuildId(envelope.msg_type().to_string()))
            }
            TopicFamily::Unrecognized => {
                Err(TelemetryError::UnknownTopic(envelope.msg_type().to_string()))
            }
        }
    }

    /// Publishes `envelope` on its topic(s).
    ///
    /// Handler failures are isolated by the bus and counted in the report.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::UnknownTopic`] or
    /// [`TelemetryError::EmptyBuildId`] if the envelope matches no known
    /// family; nothing is published and a warning is logged.
    pub fn route(&self, envelope: &Envelope) -> Result<RouteReport, TelemetryError> {
        let topics = Self::topics_for(envelope).inspect_err(|err| match err {
            TelemetryError::EmptyBuildId(_) => tracing::warn!(
                msg_type = envelope.msg_type(),
                code = err.error_code(),
                "message type has no build id"
            ),
            _ => tracing::warn!(
                msg_type = envelope.msg_type(),
                code = err.error_code(),
                "unhandled message type"
            ),
        })?;

        let mut delivery = Delivery::default();
        for topic in &topics {
            delivery += self.bus.publish(topic, envelope.data());
        }
        tracing::trace!(
            msg_type = envelope.msg_type(),
            publishes = topics.len(),
            delivered = delivery.delivered,
            "routed envelope"
        );
        Ok(RouteReport { topics, delivery })
    }
}
