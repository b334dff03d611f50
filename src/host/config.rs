//! Host runtime configuration.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::relay::config::{
    DEFAULT_API_PATH, DEFAULT_EVENT_CHANNEL_PATH, DEFAULT_MAX_WAIT, DEFAULT_WS_PATH,
};
use crate::transport::TransportKind;

// ============================================================================
// Constants
// ============================================================================

/// Delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Relay origin used when none is configured.
pub const DEFAULT_RELAY_ORIGIN: &str = "http://127.0.0.1:5173";

// ============================================================================
// TransportPreference
// ============================================================================

/// How the host chooses its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportPreference {
    /// Event channel in debug builds, raw socket otherwise.
    #[default]
    Auto,
    /// Always the raw socket.
    Socket,
    /// Always the event channel.
    EventChannel,
}

impl TransportPreference {
    /// Resolves the preference for this build.
    #[must_use]
    pub const fn resolve(self) -> TransportKind {
        match self {
            Self::Socket => TransportKind::Socket,
            Self::EventChannel => TransportKind::EventChannel,
            Self::Auto => {
                if cfg!(debug_assertions) {
                    TransportKind::EventChannel
                } else {
                    TransportKind::Socket
                }
            }
        }
    }
}

impl FromStr for TransportPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "socket" => Ok(Self::Socket),
            "event-channel" => Ok(Self::EventChannel),
            other => Err(Error::config(format!("Unknown transport: {other}"))),
        }
    }
}

impl fmt::Display for TransportPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Socket => "socket",
            Self::EventChannel => "event-channel",
        })
    }
}

// ============================================================================
// HostConfig
// ============================================================================

/// Host runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Relay origin, e.g. `http://127.0.0.1:5173`.
    pub relay_origin: String,

    /// Raw socket route on the relay.
    pub ws_path: String,

    /// Event channel route on the relay.
    pub event_channel_path: String,

    /// Prefix for action hrefs in snapshots.
    pub actions_base_path: String,

    /// Transport selection.
    pub transport: TransportPreference,

    /// Delay before reconnecting after a close or failed attempt.
    pub reconnect_delay: Duration,

    /// Ceiling for `waitForChange` timeouts.
    pub max_wait: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HostConfig {
    /// Creates a configuration pointing at the default relay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            relay_origin: DEFAULT_RELAY_ORIGIN.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            event_channel_path: DEFAULT_EVENT_CHANNEL_PATH.to_string(),
            actions_base_path: format!("{DEFAULT_API_PATH}/actions/"),
            transport: TransportPreference::Auto,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Sets the relay origin.
    #[must_use]
    pub fn with_relay_origin(mut self, origin: impl Into<String>) -> Self {
        self.relay_origin = origin.into();
        self
    }

    /// Sets the transport preference.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportPreference) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the wait ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
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

    /// Sets the href prefix used in snapshots.
    #[must_use]
    pub fn with_actions_base_path(mut self, path: impl Into<String>) -> Self {
        self.actions_base_path = path.into();
        self
    }

    /// Socket URL for a transport kind.
    ///
    /// `http` becomes `ws` and `https` becomes `wss`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the origin is not an http(s) or ws(s) URL.
    pub fn socket_url(&self, kind: TransportKind) -> Result<Url> {
        let mut url = Url::parse(&self.relay_origin)
            .map_err(|e| Error::config(format!("Invalid relay origin {:?}: {e}", self.relay_origin)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(Error::config(format!("Unsupported relay scheme: {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::config("Cannot set socket scheme"))?;

        url.set_path(match kind {
            TransportKind::Socket => &self.ws_path,
            TransportKind::EventChannel => &self.event_channel_path,
        });
        Ok(url)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a bad origin or a non-`/` href prefix.
    pub fn validate(&self) -> Result<()> {
        self.socket_url(TransportKind::Socket)?;
        if !self.actions_base_path.starts_with('/') || !self.actions_base_path.ends_with('/') {
            return Err(Error::config(
                "actions_base_path must start and end with '/'",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_urls() {
        let config = HostConfig::new().with_relay_origin("http://localhost:4000");
        assert_eq!(
            config.socket_url(TransportKind::Socket).expect("url").as_str(),
            "ws://localhost:4000/__rune_bridge_ws"
        );
        assert_eq!(
            config.socket_url(TransportKind::EventChannel).expect("url").as_str(),
            "ws://localhost:4000/__rune_bridge_events"
        );

        let secure = HostConfig::new().with_relay_origin("https://dev.example");
        assert_eq!(
            secure.socket_url(TransportKind::Socket).expect("url").scheme(),
            "wss"
        );
    }

    #[test]
    fn test_validate() {
        assert!(HostConfig::new().validate().is_ok());
        assert!(HostConfig::new().with_relay_origin("ftp://x").validate().is_err());
        assert!(HostConfig::new().with_relay_origin("not a url").validate().is_err());
        assert!(HostConfig::new().with_actions_base_path("/a").validate().is_err());
    }

    #[test]
    fn test_transport_preference() {
        assert_eq!(TransportPreference::Socket.resolve(), TransportKind::Socket);
        assert_eq!(
            TransportPreference::EventChannel.resolve(),
            TransportKind::EventChannel
        );
        assert_eq!(
            "event-channel".parse::<TransportPreference>().expect("parse"),
            TransportPreference::EventChannel
        );
        assert!("carrier-pigeon".parse::<TransportPreference>().is_err());
    }
}
