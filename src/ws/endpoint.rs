//! Transport endpoint resolution.
//!
//! The feed URL is derived from where the dashboard is served and how it is
//! deployed: `wss` behind `https`, `ws` otherwise; the page's own host in
//! production, a fixed development host everywhere else.

use std::fmt;
use std::str::FromStr;

use axum::http::Uri;

use crate::error::TelemetryError;

/// Host used outside production.
pub const DEV_HOST: &str = "localhost:8081";

/// Path of the feed endpoint on the build server.
pub const WS_PATH: &str = "/ws";

/// Scheme of the hosting page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageScheme {
    /// `https:`.
    Secure,
    /// Anything else.
    Insecure,
}

impl PageScheme {
    /// Matching WebSocket scheme.
    #[must_use]
    pub const fn transport_scheme(self) -> &'static str {
        match self {
            Self::Secure => "wss",
            Self::Insecure => "ws",
        }
    }
}

/// Location of the hosting page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    /// Page scheme.
    pub scheme: PageScheme,
    /// Page host, including the port when one is present.
    pub host: String,
}

impl PageLocation {
    /// Creates a location from its parts.
    #[must_use]
    pub fn new(scheme: PageScheme, host: impl Into<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
        }
    }

    /// Parses an absolute page URL such as `https://ci.example.com/build/7`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidPageUrl`] if `url` is not an absolute
    /// URL with a host.
    pub fn parse(url: &str) -> Result<Self, TelemetryError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| TelemetryError::InvalidPageUrl(format!("{url}: {e}")))?;
        let authority = uri
            .authority()
            .ok_or_else(|| TelemetryError::InvalidPageUrl(format!("{url}: missing host")))?;
        if authority.host().is_empty() {
            return Err(TelemetryError::InvalidPageUrl(format!("{url}: missing host")));
        }
        let host = match authority.port_u16() {
            Some(port) => format!("{}:{port}", authority.host()),
            None => authority.host().to_string(),
        };
        let scheme = if uri.scheme_str() == Some("https") {
            PageScheme::Secure
        } else {
            PageScheme::Insecure
        };
        Ok(Self { scheme, host })
    }
}

impl FromStr for PageLocation {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Deployment mode of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployMode {
    /// Served by the build server itself.
    Production,
    /// Served separately; the build server runs on [`DEV_HOST`].
    #[default]
    Development,
}

impl FromStr for DeployMode {
    type Err = std::convert::Infallible;

    /// `"production"` (any case) selects [`DeployMode::Production`]; every
    /// other value selects [`DeployMode::Development`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("production") {
            Ok(Self::Production)
        } else {
            Ok(Self::Development)
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => f.write_str("production"),
            Self::Development => f.write_str("development"),
        }
    }
}

/// Computes the feed URL for `page` in `mode`, using [`DEV_HOST`] outside
/// production.
#[must_use]
pub fn resolve_endpoint(page: &PageLocation, mode: DeployMode) -> String {
    resolve_endpoint_with(page, mode, DEV_HOST)
}

/// Like [`resolve_endpoint`] with an explicit development host.
#[must_use]
pub fn resolve_endpoint_with(page: &PageLocation, mode: DeployMode, dev_host: &str) -> String {
    let host = match mode {
        DeployMode::Production => page.host.as_str(),
        DeployMode::Development => dev_host,
    };
    format!("{}://{host}{WS_PATH}", page.scheme.transport_scheme())
}
