//! Diagnostics endpoint handlers.

pub mod system;
