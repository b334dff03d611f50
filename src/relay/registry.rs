//! Active host registry.
//!
//! Holds at most one host registration. Registration is last-writer-wins:
//! a newly registered tab always takes over. A disconnect only clears the
//! registration when it comes from the transport that owns it, so a stale
//! tab closing cannot evict its successor.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::identifiers::TransportId;
use crate::transport::Transport;

// ============================================================================
// HostRegistration
// ============================================================================

/// The active host and the transport that reaches it.
#[derive(Clone)]
pub struct HostRegistration {
    /// Host id from `registerHost`.
    pub host_id: String,
    /// Transport the host registered over.
    pub transport: Arc<dyn Transport>,
}

impl HostRegistration {
    /// Id of the owning transport.
    #[inline]
    #[must_use]
    pub fn transport_id(&self) -> TransportId {
        self.transport.id()
    }

    /// Sends a message addressed to this host.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConnectionClosed`] if the transport is gone.
    pub fn send(&self, message: &Value) -> Result<()> {
        self.transport.send_to_host(&self.host_id, message)
    }
}

impl fmt::Debug for HostRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRegistration")
            .field("host_id", &self.host_id)
            .field("transport_id", &self.transport_id())
            .finish()
    }
}

/// Result of [`HostRegistry::register_host`].
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    /// Always `true` under last-writer-wins.
    pub accepted: bool,
    /// Registration that was replaced, if any.
    pub previous: Option<HostRegistration>,
}

/// Public view of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatusReport {
    /// Whether a host is registered.
    pub connected: bool,
    /// Active host id, or `null`.
    #[serde(rename = "hostId")]
    pub host_id: Option<String>,
}

// ============================================================================
// HostRegistry
// ============================================================================

/// Single-slot registry of the active host.
#[derive(Default)]
pub struct HostRegistry {
    active: Mutex<Option<HostRegistration>>,
}

impl HostRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `host_id` over `transport` the active host.
    pub fn register_host(
        &self,
        host_id: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> RegisterOutcome {
        let registration = HostRegistration {
            host_id: host_id.into(),
            transport,
        };
        info!(
            host_id = %registration.host_id,
            transport = %registration.transport_id(),
            "Host registered"
        );
        let previous = self.active.lock().replace(registration);
        RegisterOutcome {
            accepted: true,
            previous,
        }
    }

    /// Returns the active registration.
    #[must_use]
    pub fn host(&self) -> Option<HostRegistration> {
        self.active.lock().clone()
    }

    /// Returns `{ connected, hostId }`.
    #[must_use]
    pub fn status(&self) -> HostStatusReport {
        let active = self.active.lock();
        HostStatusReport {
            connected: active.is_some(),
            host_id: active.as_ref().map(|r| r.host_id.clone()),
        }
    }

    /// Clears the registration if `transport_id` owns it.
    ///
    /// Returns `true` when the active host was removed.
    pub fn disconnect_transport(&self, transport_id: TransportId) -> bool {
        let mut active = self.active.lock();
        let owns = active
            .as_ref()
            .is_some_and(|r| r.transport_id() == transport_id);
        if owns {
            let removed = active.take();
            debug!(
                host_id = ?removed.map(|r| r.host_id),
                transport = %transport_id,
                "Active host disconnected"
            );
        }
        owns
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::SocketTransport;

    fn transport() -> Arc<dyn Transport> {
        let (transport, _rx) = SocketTransport::new();
        transport
    }

    #[test]
    fn test_empty_status() {
        let registry = HostRegistry::new();
        assert_eq!(
            registry.status(),
            HostStatusReport {
                connected: false,
                host_id: None
            }
        );
        let value = serde_json::to_value(registry.status()).expect("ser");
        assert_eq!(value, serde_json::json!({ "connected": false, "hostId": null }));
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = HostRegistry::new();
        let first = transport();
        let second = transport();

        let outcome = registry.register_host("tab-1", Arc::clone(&first));
        assert!(outcome.accepted);
        assert!(outcome.previous.is_none());

        let outcome = registry.register_host("tab-2", Arc::clone(&second));
        assert!(outcome.accepted);
        assert_eq!(outcome.previous.map(|r| r.host_id), Some("tab-1".into()));
        assert_eq!(registry.status().host_id.as_deref(), Some("tab-2"));
    }

    #[test]
    fn test_stale_disconnect_keeps_successor() {
        let registry = HostRegistry::new();
        let first = transport();
        let second = transport();
        registry.register_host("tab-1", Arc::clone(&first));
        registry.register_host("tab-2", Arc::clone(&second));

        assert!(!registry.disconnect_transport(first.id()));
        assert_eq!(registry.status().host_id.as_deref(), Some("tab-2"));

        assert!(registry.disconnect_transport(second.id()));
        assert!(!registry.status().connected);
    }
}
