//! # wake-feed
//!
//! Live build-telemetry feed for a CI dashboard.
//!
//! The build server pushes newline-delimited JSON envelopes
//! (`{"type": ..., "data": ...}`) over a WebSocket. This crate decodes each
//! envelope, maps its type to a typed [`Topic`](domain::Topic) and publishes
//! the payload on an in-process [`EventBus`](domain::EventBus) that views
//! subscribe to.
//!
//! ## Architecture
//!
//! ```text
//! Build server (WebSocket /ws)
//!     │
//!     ├── Transport driver (ws::connection)
//!     │
//!     ├── Dispatcher task (ws::dispatcher)
//!     │     ├── Frame decoder (ws::frame)
//!     │     └── Topic router (ws::router)
//!     │
//!     ├── EventBus (domain/)
//!     │
//!     ├── BuildTailService (service/)
//!     └── Diagnostics HTTP (api/)
//! ```
//!
//! A `build:log:<id>` envelope is published once on its own topic. A
//! `build:update:<id>` envelope is published on its own topic and then on
//! the aggregate update feed. Anything else is logged and dropped.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
