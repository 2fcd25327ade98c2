//! Outbound control frames: server-side subscription commands.
//!
//! The build server only forwards broadcasts whose type starts with a prefix
//! the connection subscribed to:
//!
//! ```json
//! {"type": "in:subscribe", "data": {"to": ["build:"]}}
//! ```

use serde::{Deserialize, Serialize};

/// Discriminator for client → server control frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControlType {
    /// Start receiving broadcasts for the listed prefixes.
    #[serde(rename = "in:subscribe")]
    Subscribe,
    /// Stop receiving broadcasts for the listed prefixes.
    #[serde(rename = "in:unsubscribe")]
    Unsubscribe,
}

/// Prefix list carried by a control frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeData {
    /// Type prefixes, e.g. `build:` or `build:log:42`.
    pub to: Vec<String>,
}

/// A client → server control frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlMessage {
    /// Frame type.
    #[serde(rename = "type")]
    pub msg_type: ControlType,
    /// Frame body.
    pub data: SubscribeData,
}

impl ControlMessage {
    /// `in:subscribe` frame for `prefixes`.
    #[must_use]
    pub fn subscribe(prefixes: Vec<String>) -> Self {
        Self {
            msg_type: ControlType::Subscribe,
            data: SubscribeData { to: prefixes },
        }
    }

    /// `in:unsubscribe` frame for `prefixes`.
    #[must_use]
    pub fn unsubscribe(prefixes: Vec<String>) -> Self {
        Self {
            msg_type: ControlType::Unsubscribe,
            data: SubscribeData { to: prefixes },
        }
    }

    /// Serializes the frame to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Commands accepted by the transport driver at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// Add server-side subscription prefixes.
    Subscribe(Vec<String>),
    /// Remove server-side subscription prefixes.
    Unsubscribe(Vec<String>),
}
