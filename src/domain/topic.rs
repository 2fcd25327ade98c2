//! Topics and topic families.
//!
//! Producers tag every envelope with a colon-namespaced type. Two families
//! are recognized by prefix, in priority order:
//!
//! | Prefix          | Family             | Bus topic(s)                          |
//! |-----------------|--------------------|---------------------------------------|
//! | `build:log:`    | [`TopicFamily::Log`]    | `build:log:<id>`                 |
//! | `build:update:` | [`TopicFamily::Update`] | `build:update:<id>`, `build:update:` |
//!
//! The aggregate `build:update:` topic ([`Topic::UpdateFeed`]) is synthetic:
//! it is published by the router, never accepted from producers.

use std::fmt;
use std::str::FromStr;

use super::BuildId;
use crate::error::TelemetryError;

/// Type prefix of per-build log-line envelopes.
pub const LOG_PREFIX: &str = "build:log:";

/// Type prefix of per-build status-change envelopes.
pub const UPDATE_PREFIX: &str = "build:update:";

/// A key under which subscribers register on the [`super::EventBus`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Log lines of one build (`build:log:<id>`).
    BuildLog(BuildId),
    /// Status changes of one build (`build:update:<id>`).
    BuildUpdate(BuildId),
    /// Every status change of every build (`build:update:`).
    UpdateFeed,
}

impl Topic {
    /// Log topic for `id`.
    #[must_use]
    pub fn log(id: impl Into<BuildId>) -> Self {
        Self::BuildLog(id.into())
    }

    /// Per-build update topic for `id`.
    #[must_use]
    pub fn update(id: impl Into<BuildId>) -> Self {
        Self::BuildUpdate(id.into())
    }

    /// Returns the build this topic belongs to, if any.
    #[must_use]
    pub fn build_id(&self) -> Option<&BuildId> {
        match self {
            Self::BuildLog(id) | Self::BuildUpdate(id) => Some(id),
            Self::UpdateFeed => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildLog(id) => write!(f, "{LOG_PREFIX}{id}"),
            Self::BuildUpdate(id) => write!(f, "{UPDATE_PREFIX}{id}"),
            Self::UpdateFeed => f.write_str(UPDATE_PREFIX),
        }
    }
}

impl FromStr for Topic {
    type Err = TelemetryError;

    /// Parses the string form used by consumers, including the aggregate
    /// `build:update:` topic.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == UPDATE_PREFIX {
            return Ok(Self::UpdateFeed);
        }
        match TopicFamily::classify(s) {
            TopicFamily::Log(id) => Ok(Self::BuildLog(id)),
            TopicFamily::Update(id) => Ok(Self::BuildUpdate(id)),
            TopicFamily::Unrecognized => Err(TelemetryError::UnknownTopic(s.to_string())),
        }
    }
}

/// Classification of an envelope type, computed once at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFamily {
    /// `build:log:<id>`.
    Log(BuildId),
    /// `build:update:<id>`.
    Update(BuildId),
    /// No known prefix, or a known prefix with an empty build id.
    Unrecognized,
}

impl TopicFamily {
    /// Classifies a message type by prefix. The log family is tested first.
    #[must_use]
    pub fn classify(msg_type: &str) -> Self {
        if let Some(suffix) = msg_type.strip_prefix(LOG_PREFIX) {
            return BuildId::new(suffix).map_or(Self::Unrecognized, Self::Log);
        }
        if let Some(suffix) = msg_type.strip_prefix(UPDATE_PREFIX) {
            return BuildId::new(suffix).map_or(Self::Unrecognized, Self::Update);
        }
        Self::Unrecognized
    }
}

/// Returns `true` if `msg_type` is a bare family prefix with no build id,
/// e.g. `build:log:`.
#[must_use]
pub fn has_empty_build_id(msg_type: &str) -> bool {
    msg_type == LOG_PREFIX || msg_type == UPDATE_PREFIX
}
