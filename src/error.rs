//! Feed error types.
//!
//! [`TelemetryError`] is the central error type for the crate. None of the
//! per-frame or per-handler variants ever abort the pipeline: they are
//! logged with their [`TelemetryError::error_code`] and the offending
//! segment, envelope or handler is skipped.

/// Crate-wide error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category                 |
/// |-----------|--------------------------|
/// | 1000–1999 | Inbound frame / routing  |
/// | 2000–2999 | Subscriber handlers      |
/// | 3000–3999 | Transport / pipeline     |
/// | 4000–4999 | Startup configuration    |
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A newline-delimited segment is not valid JSON or not an envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A segment decoded as JSON but its `type` is missing or empty.
    #[error("frame has no message type")]
    MissingType,

    /// The envelope type matches no known topic family.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// The envelope type has a build family prefix but no build id.
    #[error("empty build id in message type: {0}")]
    EmptyBuildId(String),

    /// A payload could not be decoded into the expected typed view.
    #[error("payload error: {0}")]
    Payload(String),

    /// A subscriber handler returned an error.
    #[error("handler error: {0}")]
    Handler(String),

    /// A subscriber handler panicked during delivery.
    #[error("handler panicked")]
    HandlerPanicked,

    /// WebSocket connect, read or write failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The dispatcher task has stopped and no longer accepts chunks.
    #[error("dispatcher closed")]
    DispatcherClosed,

    /// The hosting page URL could not be parsed.
    #[error("invalid page url: {0}")]
    InvalidPageUrl(String),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
}

impl TelemetryError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MalformedFrame(_) => 1001,
            Self::MissingType => 1002,
            Self::UnknownTopic(_) => 1003,
            Self::Payload(_) => 1004,
            Self::EmptyBuildId(_) => 1005,
            Self::Handler(_) => 2001,
            Self::HandlerPanicked => 2002,
            Self::Transport(_) => 3001,
            Self::DispatcherClosed => 3002,
            Self::InvalidPageUrl(_) => 4001,
            Self::Config(_) => 4002,
        }
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedFrame(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TelemetryError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        assert_eq!(TelemetryError::MissingType.error_code(), 1002);
        assert_eq!(TelemetryError::HandlerPanicked.error_code(), 2002);
        assert_eq!(TelemetryError::DispatcherClosed.error_code(), 3002);
        assert_eq!(TelemetryError::Config(String::new()).error_code(), 4002);
    }

    #[test]
    fn empty_build_id_has_its_own_code() {
        let err = TelemetryError::EmptyBuildId("build:log:".into());
        assert_eq!(err.error_code(), 1005);
        assert_ne!(err.error_code(), TelemetryError::UnknownTopic(String::new()).error_code());
        assert_eq!(err.to_string(), "empty build id in message type: build:log:");
    }

    #[test]
    fn json_errors_map_to_malformed_frame() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").err();
        let Some(err) = err else {
            return;
        };
        let mapped = TelemetryError::from(err);
        assert_eq!(mapped.error_code(), 1001);
        assert!(mapped.to_string().starts_with("malformed frame"));
    }
}
