//! WebSocket layer: feed transport, frame decoding, topic routing.
//!
//! Inbound text frames flow `connection` → `dispatcher` → `frame` →
//! `router` → [`EventBus`](crate::domain::EventBus). The `endpoint` module
//! picks the URL the transport connects to.

pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod frame;
pub mod messages;
pub mod router;
pub mod subscription;
