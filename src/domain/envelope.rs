//! The unit of transport: one `{ "type": ..., "data": ... }` object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::TopicFamily;
use crate::error::TelemetryError;

/// Wire shape of an inbound object.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// One decoded message.
///
/// Immutable after decoding. The topic family is classified once here so
/// the router only has to match on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Original message type, e.g. `build:log:42`.
    #[serde(rename = "type")]
    msg_type: String,
    /// Family classified from `msg_type`.
    #[serde(skip)]
    family: TopicFamily,
    /// Pass-through payload.
    data: serde_json::Value,
}

impl Envelope {
    /// Builds an envelope and classifies its type.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::MissingType`] if `msg_type` is empty.
    pub fn new(
        msg_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<Self, TelemetryError> {
        let msg_type = msg_type.into();
        if msg_type.is_empty() {
            return Err(TelemetryError::MissingType);
        }
        let family = TopicFamily::classify(&msg_type);
        Ok(Self {
            msg_type,
            family,
            data,
        })
    }

    /// Parses a single JSON object into an envelope.
    ///
    /// A missing `data` field decodes as `null`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::MalformedFrame`] if `segment` is not a JSON
    /// object of the expected shape, or [`TelemetryError::MissingType`] if
    /// the `type` field is absent or empty.
    pub fn parse(segment: &str) -> Result<Self, TelemetryError> {
        let raw: RawEnvelope = serde_json::from_str(segment)?;
        Self::new(raw.msg_type.unwrap_or_default(), raw.data)
    }

    /// Returns the message type.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Returns the classified family.
    #[must_use]
    pub const fn family(&self) -> &TopicFamily {
        &self.family
    }

    /// Returns the payload.
    #[must_use]
    pub const fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Consumes the envelope, returning its payload.
    #[must_use]
    pub fn into_data(self) -> serde_json::Value {
        self.data
    }

    /// Decodes the payload into a typed view.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Payload`] if the payload does not match `T`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, TelemetryError> {
        super::payload::decode(&self.data)
    }
}
