//! Host runtime.
//!
//! Exposes an [`AgentService`] to the relay. The runtime keeps a revision
//! tracker fed by the service, holds one connection to the relay at a time,
//! registers itself as the active host on every connect, and answers
//! relayed requests.
//!
//! # Connection Lifecycle
//!
//! 1. Dial the relay with the resolved transport
//! 2. Send `registerHost { hostId }` and mark `socketConnected`
//! 3. `registerHostResult` sets `hostAccepted`
//! 4. Serve requests until the connection closes
//! 5. Wait `reconnect_delay`, then start over unless stopped

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ErrorCode, Result};
use crate::identifiers::{HostId, RelayRequestIds};
use crate::protocol::{
    ActionResponse, Envelope, InvokeActionPayload, MessageType, RegisterHostResult,
    SnapshotLayout, validate_envelope,
};
use crate::service::{AgentService, RevisionTracker, Subscription, invoke};
use crate::transport::{Transport, TransportKind};

use super::config::HostConfig;
use super::connector::{self, HostConnection};
use super::status::HostStatus;

// ============================================================================
// Constants
// ============================================================================

/// How long to wait for the pump to finish after asking it to close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// RuntimeInner
// ============================================================================

/// State shared between the runtime handle, the connect loop and request tasks.
struct RuntimeInner {
    host_id: HostId,
    config: HostConfig,
    kind: TransportKind,
    service: Arc<dyn AgentService>,
    tracker: Arc<RevisionTracker>,
    subscription: Mutex<Subscription>,
    status: watch::Sender<HostStatus>,
    stop: watch::Sender<bool>,
    register_ids: RelayRequestIds,
}

impl RuntimeInner {
    fn new(service: Arc<dyn AgentService>, config: HostConfig) -> Arc<Self> {
        let host_id = HostId::generate();
        let layout = SnapshotLayout::new(config.actions_base_path.clone(), config.max_wait)
            .with_convention();
        let tracker = RevisionTracker::new(layout, service.description());
        let subscription = service.observe(tracker.observer());
        let (status, _) = watch::channel(HostStatus::disconnected(host_id.as_str()));
        let (stop, _) = watch::channel(false);

        Arc::new(Self {
            host_id,
            kind: config.transport.resolve(),
            config,
            service,
            tracker,
            subscription: Mutex::new(subscription),
            status,
            stop,
            register_ids: RelayRequestIds::new("register"),
        })
    }

    fn set_status(&self, next: HostStatus) {
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(
                socket_connected = next.socket_connected,
                host_accepted = next.host_accepted,
                "Host status changed"
            );
            *current = next;
            true
        });
    }

    fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }
}

// ============================================================================
// Connect Loop
// ============================================================================

impl RuntimeInner {
    async fn run(self: Arc<Self>, url: Url) {
        let mut stop_rx = self.stop.subscribe();

        while !self.is_stopping() {
            let attempt = tokio::select! {
                result = connector::connect(&url, self.kind, self.host_id.as_str()) => result,
                () = stopped(&mut stop_rx) => break,
            };

            match attempt {
                Ok(connection) => self.session(connection, &mut stop_rx).await,
                Err(e) => debug!(error = %e, "Relay connection attempt failed"),
            }

            self.set_status(HostStatus::disconnected(self.host_id.as_str()));
            if self.is_stopping() {
                break;
            }

            tokio::select! {
                () = sleep(self.config.reconnect_delay) => {}
                () = stopped(&mut stop_rx) => break,
            }
        }

        self.set_status(HostStatus::disconnected(self.host_id.as_str()));
        debug!(host_id = %self.host_id, "Host connect loop finished");
    }

    async fn session(self: &Arc<Self>, connection: HostConnection, stop_rx: &mut watch::Receiver<bool>) {
        let HostConnection {
            transport,
            mut closed,
        } = connection;

        let runtime: Weak<Self> = Arc::downgrade(self);
        let weak_transport = Arc::downgrade(&transport);
        transport.on_message(Arc::new(move |raw: Value| {
            if let (Some(runtime), Some(transport)) = (runtime.upgrade(), weak_transport.upgrade()) {
                runtime.on_message(&transport, raw);
            }
        }));

        self.set_status(HostStatus::connected(self.host_id.as_str(), false));
        let register = Envelope::new(
            self.register_ids.next_id(),
            MessageType::RegisterHost.as_str(),
        )
        .with_payload(json!({ "hostId": self.host_id }));
        if let Err(e) = transport.send(&register.to_value()) {
            warn!(error = %e, "Failed to send registerHost");
        }

        tokio::select! {
            _ = &mut closed => {}
            () = stopped(stop_rx) => {
                transport.close();
                let _ = timeout(CLOSE_GRACE, &mut closed).await;
            }
        }

        transport.clear_message_handler();
        info!(host_id = %self.host_id, "Disconnected from relay");
    }
}

/// Resolves once the stop flag is set.
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

// ============================================================================
// Request Dispatch
// ============================================================================

impl RuntimeInner {
    fn on_message(self: &Arc<Self>, transport: &Arc<dyn Transport>, raw: Value) {
        let envelope = match validate_envelope(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(code = %e.code, "Ignoring invalid envelope");
                return;
            }
        };

        if envelope.message_type == MessageType::RegisterHostResult.as_str() {
            let result = RegisterHostResult::from_payload(envelope.payload.as_ref());
            let accepted =
                result.accepted && result.active_host_id.as_deref() == Some(self.host_id.as_str());
            if accepted {
                info!(host_id = %self.host_id, "Accepted as active host");
            }
            self.set_status(HostStatus::connected(self.host_id.as_str(), accepted));
            return;
        }

        let runtime = Arc::clone(self);
        let transport = Arc::clone(transport);
        tokio::spawn(async move {
            if let Some(reply) = runtime.handle_request(envelope).await
                && let Err(e) = transport.send(&reply.to_value())
            {
                debug!(error = %e, "Failed to send reply");
            }
        });
    }

    /// Builds the reply for one relayed request, or `None` for messages
    /// that need no answer.
    async fn handle_request(&self, envelope: Envelope) -> Option<Envelope> {
        let Some(message_type) = MessageType::parse(&envelope.message_type) else {
            let payload = json!({
                "code": ErrorCode::UnsupportedMessageType,
                "message": format!("Unsupported message type: {}", envelope.message_type),
            });
            return Some(self.reply(&envelope, MessageType::Error, payload));
        };

        let response = match message_type {
            MessageType::GetSnapshot => match self.tracker.ready().await {
                Ok(snapshot) => ActionResponse::success(snapshot),
                Err(e) => ActionResponse::failure(e.to_bridge_error(), None),
            },

            MessageType::InvokeAction => {
                let payload = InvokeActionPayload::from_payload(envelope.payload.as_ref());
                let result = invoke::invoke_action(
                    self.service.as_ref(),
                    &self.tracker,
                    &payload.action_name,
                    payload.input,
                )
                .await;
                invoke::respond(result, &self.tracker)
            }

            MessageType::WaitForChange => {
                let result = invoke::wait_for_change(
                    &self.tracker,
                    envelope.payload.as_ref(),
                    self.config.max_wait,
                )
                .await;
                result.unwrap_or_else(|e| ActionResponse::failure(e.to_bridge_error(), None))
            }

            MessageType::Error
            | MessageType::RegisterHost
            | MessageType::RegisterHostResult
            | MessageType::GetSnapshotResult
            | MessageType::InvokeActionResult
            | MessageType::WaitForChangeResult => {
                debug!(message_type = %envelope.message_type, "Ignoring message not addressed to a host");
                return None;
            }
        };

        Some(self.reply(&envelope, message_type.reply(), response.to_value()))
    }

    fn reply(&self, request: &Envelope, message_type: MessageType, payload: Value) -> Envelope {
        Envelope::new(&request.request_id, message_type.as_str())
            .with_payload(payload)
            .with_host_id(self.host_id.as_str())
    }
}

// ============================================================================
// HostRuntime
// ============================================================================

/// Handle to a running host.
///
/// Dropping the handle signals the connect loop to stop; call
/// [`HostRuntime::stop`] to wait for it and drain pending waits.
pub struct HostRuntime {
    inner: Arc<RuntimeInner>,
    task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl HostRuntime {
    /// Subscribes to `service` and starts connecting to the relay.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if `config` is invalid.
    pub fn start(service: Arc<dyn AgentService>, config: HostConfig) -> Result<Self> {
        config.validate()?;
        let inner = RuntimeInner::new(service, config);
        let url = inner.config.socket_url(inner.kind)?;

        info!(host_id = %inner.host_id, %url, transport = %inner.kind, "Starting host runtime");
        let task = tokio::spawn(Arc::clone(&inner).run(url));

        Ok(Self {
            inner,
            task: Mutex::new(Some(task)),
            stopped: AtomicBool::new(false),
        })
    }

    /// This runtime's host id.
    #[inline]
    #[must_use]
    pub fn host_id(&self) -> &str {
        self.inner.host_id.as_str()
    }

    /// Transport chosen at start.
    #[inline]
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.kind
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> HostStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver notified on every status transition.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<HostStatus> {
        self.inner.status.subscribe()
    }

    /// Current revision of the hosted service.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.tracker.revision()
    }

    /// Stops the runtime. Later calls do nothing.
    ///
    /// Cancels any reconnect, closes the connection, resolves pending waits
    /// as timed out and detaches from the service.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.stop.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Host connect loop panicked");
        }

        self.inner.tracker.close();
        self.inner.subscription.lock().unsubscribe();
        self.inner
            .set_status(HostStatus::disconnected(self.inner.host_id.as_str()));
        info!(host_id = %self.inner.host_id, "Host runtime stopped");
    }

    /// Whether [`Self::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        self.inner.stop.send_replace(true);
        if !self.stopped.load(Ordering::SeqCst) {
            self.inner.tracker.close();
            self.inner.subscription.lock().unsubscribe();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;
    use crate::service::counter_service;

    fn inner() -> Arc<RuntimeInner> {
        RuntimeInner::new(Arc::new(counter_service()), HostConfig::new())
    }

    async fn ask(inner: &RuntimeInner, message_type: &str, payload: Option<Value>) -> Value {
        let mut envelope = Envelope::new("relay-1", message_type);
        envelope.payload = payload;
        let reply = inner.handle_request(envelope).await.expect("reply");
        assert_eq!(reply.request_id, "relay-1");
        assert_eq!(reply.host_id(), Some(inner.host_id.as_str()));
        reply.to_value()
    }

    #[tokio::test]
    async fn test_get_snapshot_reply() {
        let inner = inner();
        let reply = ask(&inner, "getSnapshot", None).await;
        assert_eq!(reply["type"], "getSnapshotResult");
        assert_eq!(reply["payload"]["ok"], true);
        assert_eq!(reply["payload"]["snapshot"]["revision"], 0);
        assert!(reply["payload"]["snapshot"]["_actionRequestBody"].is_string());
        assert_eq!(
            reply["payload"]["snapshot"]["actions"]["wait"]["href"],
            "/__rune_bridge/actions/wait"
        );
    }

    #[tokio::test]
    async fn test_invoke_action_replies() {
        let inner = inner();

        let reply = ask(&inner, "invokeAction", Some(json!({ "actionName": "increment" }))).await;
        assert_eq!(reply["type"], "invokeActionResult");
        assert_eq!(reply["payload"]["ok"], true);
        assert_eq!(reply["payload"]["snapshot"]["revision"], 1);

        let reply = ask(&inner, "invokeAction", Some(json!({ "actionName": "" }))).await;
        assert_eq!(reply["payload"]["error"]["code"], "invalid_action_name");

        let reply = ask(&inner, "invokeAction", Some(json!({ "actionName": "add", "input": 40 }))).await;
        assert_eq!(reply["payload"]["error"]["code"], "invalid_action_input");
        assert!(reply["payload"]["error"]["details"].is_array());
        assert_eq!(reply["payload"]["snapshot"]["revision"], 1);
    }

    #[tokio::test]
    async fn test_wait_reply_shapes() {
        let inner = inner();

        let reply = ask(&inner, "waitForChange", Some(json!({ "since": 7, "timeoutMs": 0 }))).await;
        assert_eq!(reply["type"], "waitForChangeResult");
        assert_eq!(reply["payload"]["timedOut"], false);

        let reply = ask(&inner, "waitForChange", Some(json!({ "timeoutMs": 0 }))).await;
        assert_eq!(reply["payload"]["timedOut"], true);

        let reply = ask(&inner, "waitForChange", Some(json!("later"))).await;
        assert_eq!(reply["payload"]["ok"], false);
        assert_eq!(reply["payload"]["error"]["code"], "invalid_wait_input");
    }

    #[tokio::test]
    async fn test_unknown_type_gets_error_reply() {
        let inner = inner();
        let reply = ask(&inner, "teleport", None).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["payload"]["code"], "unsupported_message_type");
    }

    #[tokio::test]
    async fn test_result_messages_are_not_answered() {
        let inner = inner();
        let envelope = Envelope::new("relay-1", "error");
        assert!(inner.handle_request(envelope).await.is_none());
    }

    #[tokio::test]
    async fn test_register_result_sets_acceptance() {
        let inner = inner();
        let (transport, _rx) = crate::transport::SocketTransport::new();
        let transport: Arc<dyn Transport> = transport;

        let own = RegisterHostResult::accepted(inner.host_id.as_str());
        let envelope = Envelope::new("register-1", "registerHostResult")
            .with_payload(serde_json::to_value(own).expect("ser"));
        inner.on_message(&transport, envelope.to_value());
        assert!(inner.status.borrow().host_accepted);

        let other = RegisterHostResult::accepted("someone-else");
        let envelope = Envelope::new("register-2", "registerHostResult")
            .with_payload(serde_json::to_value(other).expect("ser"));
        inner.on_message(&transport, envelope.to_value());
        let status = inner.status.borrow().clone();
        assert!(status.socket_connected);
        assert!(!status.host_accepted);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_without_relay() {
        let config = HostConfig::new()
            .with_relay_origin("http://127.0.0.1:9")
            .with_reconnect_delay(Duration::from_millis(10));
        let runtime = HostRuntime::start(Arc::new(counter_service()), config).expect("start");

        runtime.stop().await;
        runtime.stop().await;

        assert!(runtime.is_stopped());
        assert!(!runtime.status().socket_connected);
    }

    #[tokio::test]
    async fn test_start_rejects_bad_config() {
        let config = HostConfig::new().with_relay_origin("mailto:someone");
        let err = HostRuntime::start(Arc::new(counter_service()), config)
            .map(|_| ())
            .expect_err("invalid");
        assert!(matches!(err, Error::Config { .. }));
    }
}
