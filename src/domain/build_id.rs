//! Type-safe build identifier.
//!
//! [`BuildId`] wraps the suffix of a per-build topic (`build:log:<id>`,
//! `build:update:<id>`) so that build identifiers cannot be confused with
//! arbitrary topic strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// Identifier of one build on the build server.
///
/// The server numbers builds with decimal integers, but the feed treats the
/// id as an opaque, non-empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    /// Creates a `BuildId`, rejecting an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::UnknownTopic`] if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, TelemetryError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TelemetryError::UnknownTopic(
                "empty build id".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BuildId {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<u64> for BuildId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_is_rejected() {
        assert!(BuildId::new("").is_err());
    }

    #[test]
    fn display_is_raw_id() {
        let Ok(id) = BuildId::new("42") else {
            panic!("valid id");
        };
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn numeric_ids_convert() {
        let Ok(parsed) = "7".parse::<BuildId>() else {
            panic!("valid id");
        };
        assert_eq!(BuildId::from(7), parsed);
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(BuildId::from(1), "first");
        assert_eq!(map.get(&BuildId::from(1)), Some(&"first"));
        assert_eq!(map.get(&BuildId::from(2)), None);
    }
}
