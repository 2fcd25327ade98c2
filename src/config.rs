//! Feed configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). [`FeedConfig::from_lookup`] takes any
//! key lookup so the parsing can be exercised without touching the process
//! environment.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::BuildId;
use crate::error::TelemetryError;
use crate::ws::endpoint::{self, DEV_HOST, DeployMode, PageLocation};

/// Top-level feed configuration.
///
/// Loaded once at startup via [`FeedConfig::from_env`].
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Location of the hosting dashboard page.
    pub page: PageLocation,

    /// Deployment mode; selects the transport host.
    pub deploy_mode: DeployMode,

    /// Transport host used outside production.
    pub dev_host: String,

    /// Prefixes the build server should forward to this client.
    pub feed_topics: Vec<String>,

    /// Builds whose logs are tailed from startup.
    pub watch_builds: Vec<BuildId>,

    /// Bound of the dispatcher queue, in chunks.
    pub dispatch_queue_capacity: usize,

    /// Delay before the first reconnect attempt.
    pub reconnect_initial_backoff: Duration,

    /// Ceiling for the reconnect delay.
    pub reconnect_max_backoff: Duration,

    /// Bind address of the diagnostics HTTP server; disabled when `None`.
    pub diagnostics_addr: Option<SocketAddr>,

    /// Emit JSON log lines instead of human-readable text.
    pub json_logs: bool,
}

impl FeedConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// See [`FeedConfig::from_lookup`].
    pub fn from_env() -> Result<Self, TelemetryError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing keys. Unparsable numbers also fall back to their default.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Config`] if `PAGE_URL` or
    /// `DIAGNOSTICS_ADDR` is set but invalid, or if the reconnect backoff
    /// bounds are inverted.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TelemetryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let page_url = lookup("PAGE_URL").unwrap_or_else(|| "http://localhost:8080/".to_string());
        let page = PageLocation::parse(&page_url)
            .map_err(|e| TelemetryError::Config(format!("PAGE_URL: {e}")))?;

        let deploy_mode: DeployMode = lookup("DEPLOY_MODE")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        let dev_host = lookup("DEV_HOST")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEV_HOST.to_string());

        let feed_topics = lookup("FEED_TOPICS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|| vec!["build:".to_string()]);

        let watch_builds = lookup("WATCH_BUILDS")
            .map(|v| split_list(&v))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| BuildId::new(id).ok())
            .collect();

        let dispatch_queue_capacity = parse_or(&lookup, "DISPATCH_QUEUE_CAPACITY", 1024);
        let reconnect_initial_backoff =
            Duration::from_millis(parse_or(&lookup, "RECONNECT_INITIAL_BACKOFF_MS", 1_000));
        let reconnect_max_backoff =
            Duration::from_millis(parse_or(&lookup, "RECONNECT_MAX_BACKOFF_MS", 30_000));
        if reconnect_initial_backoff > reconnect_max_backoff {
            return Err(TelemetryError::Config(
                "RECONNECT_INITIAL_BACKOFF_MS exceeds RECONNECT_MAX_BACKOFF_MS".to_string(),
            ));
        }

        let diagnostics_addr = match lookup("DIAGNOSTICS_ADDR").filter(|v| !v.trim().is_empty()) {
            Some(addr) => Some(
                addr.trim()
                    .parse::<SocketAddr>()
                    .map_err(|e| TelemetryError::Config(format!("DIAGNOSTICS_ADDR: {e}")))?,
            ),
            None => None,
        };

        let json_logs = lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            page,
            deploy_mode,
            dev_host,
            feed_topics,
            watch_builds,
            dispatch_queue_capacity,
            reconnect_initial_backoff,
            reconnect_max_backoff,
            diagnostics_addr,
            json_logs,
        })
    }

    /// Feed URL for the configured page and mode.
    #[must_use]
    pub fn endpoint(&self) -> String {
        endpoint::resolve_endpoint_with(&self.page, self.deploy_mode, &self.dev_host)
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Splits a comma-separated list, dropping blank items.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
