//! Domain layer: build identity, topics, envelopes, payloads and the
//! event bus that fans payloads out to subscribers.

pub mod build_id;
pub mod envelope;
pub mod event_bus;
pub mod payload;
pub mod topic;

pub use build_id::BuildId;
pub use envelope::Envelope;
pub use event_bus::{Delivery, EventBus, Subscription, SubscriptionId};
pub use payload::{BuildStatus, BuildUpdate, LogLine, TaskState};
pub use topic::{Topic, TopicFamily};
