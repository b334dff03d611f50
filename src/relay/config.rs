//! Relay server configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rune_bridge::RelayConfig;
//!
//! let config = RelayConfig::new()
//!     .with_port(5173)
//!     .with_relay_timeout(Duration::from_secs(5));
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default host-status route.
pub const DEFAULT_HOST_STATUS_PATH: &str = "/__rune_bridge_host";

/// Default snapshot/actions API root.
pub const DEFAULT_API_PATH: &str = "/__rune_bridge";

/// Default raw socket route.
pub const DEFAULT_WS_PATH: &str = "/__rune_bridge_ws";

/// Default event channel route.
pub const DEFAULT_EVENT_CHANNEL_PATH: &str = "/__rune_bridge_events";

/// Default time a non-wait relay request may stay in flight.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default host wait ceiling assumed by the relay.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Extra time granted to a relayed wait beyond its own timeout.
pub const DEFAULT_WAIT_MARGIN: Duration = Duration::from_secs(2);

// ============================================================================
// RelayConfig
// ============================================================================

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to bind; `0` picks a free port.
    pub port: u16,

    /// `GET` route reporting the active host.
    pub host_status_path: String,

    /// Snapshot route; actions live under `{api_path}/actions/`.
    pub api_path: String,

    /// Raw socket route for hosts.
    pub ws_path: String,

    /// Event channel route for hosts.
    pub event_channel_path: String,

    /// Timeout for relayed requests other than `wait`.
    pub relay_timeout: Duration,

    /// Wait ceiling assumed for a `wait` without `timeoutMs`.
    ///
    /// Keep it at or above the host's own ceiling.
    pub max_wait: Duration,

    /// Margin added to a relayed wait's own timeout.
    pub wait_margin: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RelayConfig {
    /// Creates a configuration with default routes and timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5173,
            host_status_path: DEFAULT_HOST_STATUS_PATH.to_string(),
            api_path: DEFAULT_API_PATH.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            event_channel_path: DEFAULT_EVENT_CHANNEL_PATH.to_string(),
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
            max_wait: DEFAULT_MAX_WAIT,
            wait_margin: DEFAULT_WAIT_MARGIN,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RelayConfig {
    /// Sets the bind interface.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the bind port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the API root.
    #[must_use]
    pub fn with_api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = path.into();
        self
    }

    /// Sets the host-status route.
    #[must_use]
    pub fn with_host_status_path(mut self, path: impl Into<String>) -> Self {
        self.host_status_path = path.into();
        self
    }

    /// Sets the raw socket route.
    #[must_use]
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Sets the event channel route.
    #[must_use]
    pub fn with_event_channel_path(mut self, path: impl Into<String>) -> Self {
        self.event_channel_path = path.into();
        self
    }

    /// Sets the timeout for non-wait relay requests.
    #[inline]
    #[must_use]
    pub fn with_relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    /// Sets the ceiling for `wait` timeouts.
    #[inline]
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Sets the margin added to relayed waits.
    #[inline]
    #[must_use]
    pub fn with_wait_margin(mut self, margin: Duration) -> Self {
        self.wait_margin = margin;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl RelayConfig {
    /// Prefix of action routes, ending in `/`.
    #[must_use]
    pub fn actions_prefix(&self) -> String {
        format!("{}/actions/", self.api_path)
    }

    /// `host:port` bind address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a route does not start with `/`, two
    /// routes collide, or the relay timeout is zero.
    pub fn validate(&self) -> Result<()> {
        let routes = [
            ("host_status_path", &self.host_status_path),
            ("api_path", &self.api_path),
            ("ws_path", &self.ws_path),
            ("event_channel_path", &self.event_channel_path),
        ];

        for (name, path) in routes {
            if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
                return Err(Error::config(format!(
                    "{name} must start with '/' and not end with '/': {path:?}"
                )));
            }
        }

        for (i, (a_name, a)) in routes.iter().enumerate() {
            if let Some((b_name, _)) = routes[i + 1..].iter().find(|(_, b)| b == a) {
                return Err(Error::config(format!("{a_name} and {b_name} share the route {a}")));
            }
        }

        if self.relay_timeout.is_zero() {
            return Err(Error::config("relay_timeout must be greater than zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
