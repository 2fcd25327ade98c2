//! Server-side subscription set for one feed connection.
//!
//! Tracks which type prefixes the build server should forward to this
//! client. The set survives reconnects and is replayed on every new
//! connection, narrowest prefixes first.

use std::collections::BTreeSet;

/// Prefixes the server forwards to this client.
#[derive(Debug, Default, Clone)]
pub struct RemoteSubscriptions {
    prefixes: BTreeSet<String>,
}

impl RemoteSubscriptions {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds prefixes, skipping any already covered by an existing prefix.
    ///
    /// Returns the prefixes that were actually added.
    pub fn subscribe<I, S>(&mut self, prefixes: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = Vec::new();
        for prefix in prefixes {
            let prefix = prefix.into();
            if prefix.is_empty() || self.matches(&prefix) {
                continue;
            }
            self.prefixes.insert(prefix.clone());
            added.push(prefix);
        }
        added
    }

    /// Removes exact prefixes. Returns the prefixes that were present.
    pub fn unsubscribe<I, S>(&mut self, prefixes: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        prefixes
            .into_iter()
            .filter_map(|p| self.prefixes.take(p.as_ref()))
            .collect()
    }

    /// Returns `true` if the server forwards messages of `msg_type`.
    #[must_use]
    pub fn matches(&self, msg_type: &str) -> bool {
        self.prefixes.iter().any(|p| msg_type.starts_with(p.as_str()))
    }

    /// Returns all prefixes in replay order: longest first, ties sorted.
    ///
    /// The server drops a subscribe whose prefix is already covered and
    /// unsubscribes the first held prefix that covers the request, so a
    /// narrow prefix has to reach it before any broader one covering it.
    #[must_use]
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.prefixes.iter().cloned().collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        prefixes
    }

    /// Returns the number of prefixes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.prefixes.len()
    }

    /// Returns `true` if no prefix is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
