//! Raw socket transport.
//!
//! One envelope per text frame, no wrapping. Used by hosts outside a dev
//! server and by tooling that talks to the relay directly.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::identifiers::TransportId;

use super::{Channel, MessageHandler, Outbound, Transport, TransportKind};

// ============================================================================
// SocketTransport
// ============================================================================

/// Transport that writes each message as its own text frame.
pub struct SocketTransport {
    channel: Channel,
}

impl SocketTransport {
    /// Creates a transport and the outbound queue its pump must drain.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (channel, rx) = Channel::new();
        (Arc::new(Self { channel }), rx)
    }

    /// Decodes one inbound text frame and dispatches it.
    ///
    /// Frames that are not JSON are logged and dropped.
    pub fn receive_text(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.channel.dispatch(message),
            Err(e) => debug!(transport = %self.channel.id(), error = %e, "Ignoring malformed frame"),
        }
    }

    /// Called by the pump once the connection is gone.
    pub fn mark_closed(&self) {
        self.channel.mark_closed();
    }
}

impl Transport for SocketTransport {
    fn id(&self) -> TransportId {
        self.channel.id()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn send(&self, message: &Value) -> Result<()> {
        self.channel.push_text(serde_json::to_string(message)?)
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
