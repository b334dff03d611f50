//! Relay router.
//!
//! Turns controller requests into envelopes for the active host, correlates
//! replies, and processes host-originated messages (`registerHost`).
//!
//! # Request Lifecycle
//!
//! 1. Look up the active host, or fail with `host_unavailable`
//! 2. Allocate `relay-N`, insert a pending entry, send the envelope
//! 3. Await the reply under a timeout
//! 4. Reply, timeout, disconnect or shutdown resolves the entry once

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, ErrorCode, Result};
use crate::identifiers::{RelayRequestIds, TransportId};
use crate::protocol::{
    Envelope, InvokeActionPayload, MessageType, RegisterHostResult, WAIT_ACTION, register_host_id,
    validate_envelope,
};
use crate::transport::Transport;

use super::config::RelayConfig;
use super::pending::PendingRelays;
use super::registry::{HostRegistry, HostStatusReport};

// ============================================================================
// RelayRouter
// ============================================================================

/// Routes controller requests to the active host and host messages back.
pub struct RelayRouter {
    config: RelayConfig,
    registry: HostRegistry,
    pending: PendingRelays,
    ids: RelayRequestIds,
    /// Every live transport, so shutdown can close them.
    connections: Mutex<FxHashMap<TransportId, Weak<dyn Transport>>>,
}

impl RelayRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(config: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: HostRegistry::new(),
            pending: PendingRelays::new(),
            ids: RelayRequestIds::new("relay"),
            connections: Mutex::new(FxHashMap::default()),
        })
    }

    /// Relay configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// `{ connected, hostId }` of the registry.
    #[must_use]
    pub fn host_status(&self) -> HostStatusReport {
        self.registry.status()
    }

    /// Number of in-flight relay requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of live transports.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

// ============================================================================
// Outbound Relay
// ============================================================================

impl RelayRouter {
    /// Sends `message_type` to the active host and awaits its reply payload.
    ///
    /// # Errors
    ///
    /// - [`Error::HostUnavailable`] if no host is registered
    /// - [`Error::RelayTimeout`] if no reply arrives within `timeout_after`
    /// - [`Error::HostDisconnected`] if the host goes away first
    pub async fn relay(
        &self,
        message_type: MessageType,
        payload: Option<Value>,
        timeout_after: Duration,
    ) -> Result<Value> {
        let host = self.registry.host().ok_or(Error::HostUnavailable)?;
        let request_id = self.ids.next_id();
        let rx = self
            .pending
            .insert(&request_id, &host.host_id, host.transport_id());

        let mut envelope = Envelope::new(&request_id, message_type.as_str());
        envelope.payload = payload;

        if let Err(e) = host.send(&envelope.to_value()) {
            self.pending.remove(&request_id);
            warn!(request_id, host_id = %host.host_id, error = %e, "Failed to send to host");
            return Err(Error::HostDisconnected);
        }
        trace!(request_id, message_type = message_type.as_str(), "Relayed to host");

        match timeout(timeout_after, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::HostDisconnected),
            Err(_) => {
                self.pending.remove(&request_id);
                debug!(request_id, timeout_ms = timeout_after.as_millis() as u64, "Relay timed out");
                Err(Error::relay_timeout(
                    request_id,
                    timeout_after.as_millis() as u64,
                ))
            }
        }
    }

    /// Relays `getSnapshot`.
    ///
    /// # Errors
    ///
    /// See [`Self::relay`].
    pub async fn get_snapshot(&self) -> Result<Value> {
        self.relay(MessageType::GetSnapshot, None, self.config.relay_timeout)
            .await
    }

    /// Relays an action call; `wait` becomes `waitForChange`.
    ///
    /// # Errors
    ///
    /// See [`Self::relay`].
    pub async fn invoke_action(&self, name: &str, input: Option<Value>) -> Result<Value> {
        if name == WAIT_ACTION {
            let timeout_after = self.wait_relay_timeout(input.as_ref());
            return self
                .relay(MessageType::WaitForChange, input, timeout_after)
                .await;
        }

        let payload = serde_json::to_value(InvokeActionPayload::new(name, input))?;
        self.relay(
            MessageType::InvokeAction,
            Some(payload),
            self.config.relay_timeout,
        )
        .await
    }

    /// Relay window for a wait: never shorter than the wait itself plus margin.
    ///
    /// The host applies its own ceiling, so a requested `timeoutMs` is taken
    /// as-is (floored at zero). Without one, the host waits up to its own
    /// ceiling, which [`RelayConfig::max_wait`] stands in for.
    #[must_use]
    pub fn wait_relay_timeout(&self, input: Option<&Value>) -> Duration {
        let requested = input
            .and_then(|i| i.get("timeoutMs"))
            .and_then(Value::as_f64)
            .filter(|ms| ms.is_finite())
            .map_or(self.config.max_wait, |ms| {
                Duration::from_millis(ms.max(0.0) as u64)
            });
        self.config
            .relay_timeout
            .max(requested.saturating_add(self.config.wait_margin))
    }
}

// ============================================================================
// Inbound Messages
// ============================================================================

impl RelayRouter {
    /// Wires a new transport into the router.
    ///
    /// Inbound messages are validated as envelopes; invalid ones are logged
    /// and dropped.
    pub fn attach(self: &Arc<Self>, transport: Arc<dyn Transport>) {
        let transport_id = transport.id();
        self.connections
            .lock()
            .insert(transport_id, Arc::downgrade(&transport));

        let router = Arc::downgrade(self);
        let weak_transport = Arc::downgrade(&transport);
        transport.on_message(Arc::new(move |raw: Value| {
            let (Some(router), Some(transport)) = (router.upgrade(), weak_transport.upgrade())
            else {
                return;
            };
            match validate_envelope(&raw) {
                Ok(envelope) => router.handle_inbound(&transport, envelope),
                Err(e) => debug!(transport = %transport_id, code = %e.code, "Ignoring invalid envelope"),
            }
        }));
        debug!(transport = %transport_id, kind = %transport.kind(), "Transport attached");
    }

    /// Processes one validated envelope from a transport.
    pub fn handle_inbound(&self, transport: &Arc<dyn Transport>, envelope: Envelope) {
        if self.pending.contains(&envelope.request_id) {
            let host_id = envelope.host_id().map(str::to_string);
            let payload = envelope.payload.unwrap_or(Value::Null);
            self.pending
                .resolve(&envelope.request_id, host_id.as_deref(), payload);
            return;
        }

        match MessageType::parse(&envelope.message_type) {
            Some(MessageType::RegisterHost) => self.handle_register(transport, &envelope),
            _ => {
                let reply = Envelope::new(&envelope.request_id, MessageType::Error.as_str())
                    .with_payload(json!({
                        "code": ErrorCode::UnsupportedMessageType,
                        "message": format!("Unsupported message type: {}", envelope.message_type),
                    }));
                if let Err(e) = transport.send(&reply.to_value()) {
                    debug!(error = %e, "Failed to send error reply");
                }
            }
        }
    }

    fn handle_register(&self, transport: &Arc<dyn Transport>, envelope: &Envelope) {
        let reply_type = MessageType::RegisterHostResult.as_str();

        let Some(host_id) = register_host_id(envelope.payload.as_ref()) else {
            let result = RegisterHostResult::refused(ErrorCode::InvalidHostId.as_str());
            let reply = Envelope::new(&envelope.request_id, reply_type)
                .with_payload(serde_json::to_value(result).unwrap_or(Value::Null));
            if let Err(e) = transport.send(&reply.to_value()) {
                debug!(error = %e, "Failed to send registration refusal");
            }
            return;
        };

        let outcome = self.registry.register_host(&host_id, Arc::clone(transport));
        if let Some(previous) = &outcome.previous
            && (previous.host_id != host_id || previous.transport_id() != transport.id())
        {
            let rejected = self.pending.reject_superseded(&host_id, transport.id());
            info!(
                previous = %previous.host_id,
                active = %host_id,
                rejected,
                "Host takeover"
            );
        }

        let result = RegisterHostResult::accepted(&host_id);
        let reply = Envelope::new(&envelope.request_id, reply_type)
            .with_payload(serde_json::to_value(result).unwrap_or(Value::Null));
        if let Err(e) = transport.send_to_host(&host_id, &reply.to_value()) {
            debug!(error = %e, "Failed to send registration result");
        }
    }
}

// ============================================================================
// Teardown
// ============================================================================

impl RelayRouter {
    /// Forgets a transport whose connection closed.
    ///
    /// Pending requests sent over it fail with `host_disconnected`; the
    /// registry is cleared only if this transport owned it.
    pub fn disconnect(&self, transport_id: TransportId) {
        self.connections.lock().remove(&transport_id);
        let rejected = self.pending.reject_transport(transport_id);
        let was_active = self.registry.disconnect_transport(transport_id);
        debug!(transport = %transport_id, rejected, was_active, "Transport detached");
    }

    /// Fails every pending request and closes every transport.
    pub fn shutdown(&self) {
        let rejected = self.pending.reject_all();
        let connections: Vec<_> = self.connections.lock().drain().collect();
        for (id, transport) in connections {
            if let Some(transport) = transport.upgrade() {
                transport.close();
            }
            self.registry.disconnect_transport(id);
        }
        info!(rejected, "Relay router shut down");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    use crate::transport::{Outbound, SocketTransport};

    struct Peer {
        transport: Arc<SocketTransport>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
    }

    impl Peer {
        fn attach(router: &Arc<RelayRouter>) -> Self {
            let (transport, outbound) = SocketTransport::new();
            router.attach(transport.clone());
            Self {
                transport,
                outbound,
            }
        }

        fn send(&self, envelope: Envelope) {
            self.transport.receive_text(&envelope.to_value().to_string());
        }

        fn register(&mut self, host_id: &str) -> Value {
            self.send(Envelope::new("register-1", "registerHost").with_payload(json!({ "hostId": host_id })));
            self.next().expect("registration reply")
        }

        fn next(&mut self) -> Option<Value> {
            match self.outbound.try_recv() {
                Ok(Outbound::Text(text)) => serde_json::from_str(&text).ok(),
                _ => None,
            }
        }

        async fn recv(&mut self) -> Value {
            loop {
                if let Some(value) = self.next() {
                    return value;
                }
                tokio::task::yield_now().await;
            }
        }
    }

    fn router() -> Arc<RelayRouter> {
        RelayRouter::new(RelayConfig::new().with_relay_timeout(Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn test_no_host_is_unavailable() {
        let router = router();
        let err = router.get_snapshot().await.expect_err("no host");
        assert!(matches!(err, Error::HostUnavailable));
    }

    #[tokio::test]
    async fn test_register_and_relay_round_trip() {
        let router = router();
        let mut peer = Peer::attach(&router);

        let reply = peer.register("tab-1");
        assert_eq!(reply["type"], "registerHostResult");
        assert_eq!(reply["payload"], json!({ "accepted": true, "activeHostId": "tab-1" }));
        assert_eq!(router.host_status().host_id.as_deref(), Some("tab-1"));

        let task = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.get_snapshot().await })
        };
        let request = peer.recv().await;
        assert_eq!(request["type"], "getSnapshot");
        assert_eq!(request["requestId"], "relay-1");

        peer.send(
            Envelope::new("relay-1", "getSnapshotResult")
                .with_payload(json!({ "ok": true }))
                .with_host_id("tab-1"),
        );
        let payload = task.await.expect("join").expect("reply");
        assert_eq!(payload, json!({ "ok": true }));
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_host_id_refused() {
        let router = router();
        let mut peer = Peer::attach(&router);
        let reply = peer.register("  ");
        assert_eq!(reply["payload"], json!({ "accepted": false, "reason": "invalid_host_id" }));
        assert!(!router.host_status().connected);
    }

    #[tokio::test]
    async fn test_unsupported_message_type() {
        let router = router();
        let mut peer = Peer::attach(&router);
        peer.send(Envelope::new("x-1", "launch"));
        let reply = peer.next().expect("error reply");
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["requestId"], "x-1");
        assert_eq!(reply["payload"]["code"], "unsupported_message_type");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_pending_entry() {
        let router = router();
        let mut peer = Peer::attach(&router);
        peer.register("tab-1");

        let err = router.get_snapshot().await.expect_err("timeout");
        assert!(err.is_timeout());
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_takeover_rejects_superseded_requests() {
        let router = router();
        let mut first = Peer::attach(&router);
        first.register("tab-1");

        let task = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.get_snapshot().await })
        };
        first.recv().await;

        let mut second = Peer::attach(&router);
        let reply = second.register("tab-2");
        assert_eq!(reply["payload"]["activeHostId"], "tab-2");

        let err = task.await.expect("join").expect_err("superseded");
        assert!(matches!(err, Error::HostDisconnected));

        router.disconnect(first.transport.id());
        assert_eq!(router.host_status().host_id.as_deref(), Some("tab-2"));
    }

    #[tokio::test]
    async fn test_disconnect_rejects_in_flight() {
        let router = router();
        let mut peer = Peer::attach(&router);
        peer.register("tab-1");

        let task = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.invoke_action("increment", None).await })
        };
        let request = peer.recv().await;
        assert_eq!(request["payload"], json!({ "actionName": "increment" }));

        router.disconnect(peer.transport.id());
        let err = task.await.expect("join").expect_err("disconnected");
        assert!(matches!(err, Error::HostDisconnected));
        assert!(!router.host_status().connected);
    }

    #[test]
    fn test_wait_relay_timeout() {
        let router = RelayRouter::new(RelayConfig::new());
        assert_eq!(router.wait_relay_timeout(None), Duration::from_secs(32));
        assert_eq!(
            router.wait_relay_timeout(Some(&json!({ "timeoutMs": 1000 }))),
            Duration::from_secs(10)
        );
        assert_eq!(
            router.wait_relay_timeout(Some(&json!({ "timeoutMs": 20_000 }))),
            Duration::from_secs(22)
        );
        assert_eq!(
            router.wait_relay_timeout(Some(&json!({ "timeoutMs": -5 }))),
            Duration::from_secs(10)
        );
        assert_eq!(
            router.wait_relay_timeout(Some(&json!({ "timeoutMs": "soon" }))),
            Duration::from_secs(32)
        );
    }

    #[test]
    fn test_wait_relay_timeout_ignores_relay_ceiling_for_explicit_waits() {
        let router = RelayRouter::new(RelayConfig::new().with_max_wait(Duration::from_secs(5)));
        let host_ceiling = Duration::from_secs(30);

        let explicit = router.wait_relay_timeout(Some(&json!({ "timeoutMs": 20_000 })));
        assert!(explicit > Duration::from_secs(20));
        assert_eq!(explicit, Duration::from_secs(22));

        let beyond_host = router.wait_relay_timeout(Some(&json!({ "timeoutMs": 999_999 })));
        assert!(beyond_host > host_ceiling);

        let huge = router.wait_relay_timeout(Some(&json!({ "timeoutMs": 1e300 })));
        assert!(huge > host_ceiling);
    }

    #[tokio::test]
    async fn test_reply_from_other_host_is_ignored() {
        let router = router();
        let mut peer = Peer::attach(&router);
        peer.register("tab-1");

        let task = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.get_snapshot().await })
        };
        let request = peer.recv().await;
        let request_id = request["requestId"].as_str().expect("id").to_string();

        peer.send(Envelope::new(&request_id, "getSnapshotResult").with_host_id("tab-9"));
        assert_eq!(router.pending_count(), 1);

        peer.send(Envelope::new(&request_id, "getSnapshotResult").with_payload(json!(1)));
        assert_eq!(task.await.expect("join").expect("reply"), json!(1));
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let router = router();
        let mut peer = Peer::attach(&router);
        peer.register("tab-1");

        router.shutdown();
        assert!(peer.transport.is_closed());
        assert!(!router.host_status().connected);
        assert_eq!(router.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_in_flight_requests() {
        let router = RelayRouter::new(RelayConfig::new());
        let mut peer = Peer::attach(&router);
        peer.register("tab-1");

        let snapshot = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.get_snapshot().await })
        };
        let wait = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .invoke_action(WAIT_ACTION, Some(json!({ "timeoutMs": 60_000 })))
                    .await
            })
        };
        peer.recv().await;
        peer.recv().await;
        assert_eq!(router.pending_count(), 2);

        router.shutdown();
        assert_eq!(router.pending_count(), 0);

        let err = snapshot.await.expect("join").expect_err("rejected");
        assert!(matches!(err, Error::HostDisconnected));
        let err = wait.await.expect("join").expect_err("rejected");
        assert!(matches!(err, Error::HostDisconnected));
    }
}
