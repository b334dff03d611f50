//! Custom-event transport.
//!
//! Frames are custom events on a shared hot channel:
//!
//! ```text
//! { "type": "custom", "event": "rune-dev-bridge:event", "data": <payload> }
//! ```
//!
//! Host to relay, `data` is the envelope itself. Relay to host, `data` is
//! `{ toHostId, envelope }` because every tab on the channel sees every
//! frame. A host-side transport created with a local host id drops frames
//! addressed to someone else.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::Result;
use crate::identifiers::TransportId;

use super::{Channel, MessageHandler, Outbound, Transport, TransportKind};

// ============================================================================
// Constants
// ============================================================================

/// Custom event name carrying bridge traffic.
pub const EVENT_NAME: &str = "rune-dev-bridge:event";

// ============================================================================
// EventChannelTransport
// ============================================================================

/// Transport speaking the custom-event framing.
pub struct EventChannelTransport {
    channel: Channel,
    local_host_id: Mutex<Option<String>>,
}

impl EventChannelTransport {
    /// Creates a transport and the outbound queue its pump must drain.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (channel, rx) = Channel::new();
        let transport = Self {
            channel,
            local_host_id: Mutex::new(None),
        };
        (Arc::new(transport), rx)
    }

    /// Restricts inbound addressed frames to `host_id`.
    pub fn set_local_host_id(&self, host_id: impl Into<String>) {
        *self.local_host_id.lock() = Some(host_id.into());
    }

    /// Decodes one inbound text frame and dispatches its payload.
    ///
    /// Frames for other events, other hosts, or with bad JSON are dropped.
    pub fn receive_text(&self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(transport = %self.channel.id(), error = %e, "Ignoring malformed frame");
                return;
            }
        };

        if let Some(message) = self.unwrap_frame(frame) {
            self.channel.dispatch(message);
        }
    }

    fn unwrap_frame(&self, mut frame: Value) -> Option<Value> {
        let is_bridge_event = frame.get("type").and_then(Value::as_str) == Some("custom")
            && frame.get("event").and_then(Value::as_str) == Some(EVENT_NAME);
        if !is_bridge_event {
            trace!(transport = %self.channel.id(), "Ignoring unrelated event");
            return None;
        }

        let mut data = frame.get_mut("data").map(Value::take)?;

        let addressed = data.get("envelope").is_some() && data.get("toHostId").is_some();
        if !addressed {
            return Some(data);
        }

        let target = data.get("toHostId").and_then(Value::as_str).map(str::to_string);
        if let Some(local) = self.local_host_id.lock().as_deref()
            && target.as_deref() != Some(local)
        {
            trace!(transport = %self.channel.id(), ?target, "Frame addressed to another host");
            return None;
        }
        data.get_mut("envelope").map(Value::take)
    }

    /// Called by the pump once the connection is gone.
    pub fn mark_closed(&self) {
        self.channel.mark_closed();
    }

    fn push_event(&self, data: Value) -> Result<()> {
        let frame = json!({ "type": "custom", "event": EVENT_NAME, "data": data });
        self.channel.push_text(serde_json::to_string(&frame)?)
    }
}

impl Transport for EventChannelTransport {
    fn id(&self) -> TransportId {
        self.channel.id()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::EventChannel
    }

    fn send(&self, message: &Value) -> Result<()> {
        self.push_event(message.clone())
    }

    fn send_to_host(&self, host_id: &str, message: &Value) -> Result<()> {
        self.push_event(json!({ "toHostId": host_id, "envelope": message }))
    }

    fn on_message(&self, handler: MessageHandler) {
        self.channel.set_handler(handler);
    }

    fn clear_message_handler(&self) {
        self.channel.clear_handler();
    }

    fn close(&self) {
        self.channel.close();
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
