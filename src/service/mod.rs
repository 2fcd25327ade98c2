//! Service layer: consumers built on top of the event bus.
//!
//! [`BuildTailService`] follows build status on the aggregate update topic
//! and tails the log topics of running builds.

pub mod tail_service;

pub use tail_service::{BuildTailService, TailSink, TracingSink};
