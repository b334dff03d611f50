//! Host connection status.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// HostStatus
// ============================================================================

/// Connection status of one host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    /// Transport is open.
    #[serde(rename = "socketConnected")]
    pub socket_connected: bool,

    /// The relay confirmed this host as the active one.
    #[serde(rename = "hostAccepted")]
    pub host_accepted: bool,

    /// This runtime's host id.
    #[serde(rename = "hostId")]
    pub host_id: String,
}

/// Coarse state derived from [`HostStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No transport.
    Disconnected,
    /// Connected, another host is active.
    Standby,
    /// Connected and active.
    Active,
}

impl HostStatus {
    /// Disconnected status for `host_id`.
    #[must_use]
    pub fn disconnected(host_id: impl Into<String>) -> Self {
        Self {
            socket_connected: false,
            host_accepted: false,
            host_id: host_id.into(),
        }
    }

    /// Connected, awaiting or lacking acceptance.
    #[must_use]
    pub fn connected(host_id: impl Into<String>, host_accepted: bool) -> Self {
        Self {
            socket_connected: true,
            host_accepted,
            host_id: host_id.into(),
        }
    }

    /// Coarse state.
    #[must_use]
    pub fn state(&self) -> BridgeState {
        match (self.socket_connected, self.host_accepted) {
            (false, _) => BridgeState::Disconnected,
            (true, false) => BridgeState::Standby,
            (true, true) => BridgeState::Active,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label<'a>(&self, labels: &'a StatusLabels) -> &'a str {
        match self.state() {
            BridgeState::Disconnected => &labels.disconnected,
            BridgeState::Standby => &labels.connected_standby,
            BridgeState::Active => &labels.host_active,
        }
    }
}

// ============================================================================
// StatusLabels
// ============================================================================

/// Text shown for each [`BridgeState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLabels {
    /// No transport.
    pub disconnected: String,
    /// Connected, not active.
    pub connected_standby: String,
    /// Connected and active.
    pub host_active: String,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            disconnected: "Bridge disconnected".to_string(),
            connected_standby: "Bridge connected (standby)".to_string(),
            host_active: "Bridge host active".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
