//! Message transports between relay and host.
//!
//! A transport moves JSON messages in both directions over one live
//! connection. The relay and the host runtime only see the [`Transport`]
//! capability; how frames travel is up to the implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Relay (axum)   │     raw socket frames        │  Host runtime   │
//! │                 │◄────────────────────────────►│                 │
//! │  RelayRouter    │   or custom event frames     │  HostRuntime    │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! Each transport owns an outbound queue drained by a pump task (axum on the
//! relay side, tungstenite on the host side). Inbound text is handed to the
//! transport, decoded, and passed to the registered message handler.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | Envelope-per-frame socket transport |
//! | `event_channel` | Custom-event framing shared with a dev server's hot channel |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::TransportId;

// ============================================================================
// Submodules
// ============================================================================

/// Custom-event transport.
pub mod event_channel;

/// Raw socket transport.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use event_channel::{EVENT_NAME, EventChannelTransport};
pub use socket::SocketTransport;

// ============================================================================
// Types
// ============================================================================

/// Inbound message callback.
///
/// Receives each decoded message. Malformed frames never reach it.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Frame queued for the pump task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame.
    Text(String),
    /// Close the connection.
    Close,
}

/// Which transport a host uses to reach the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One envelope per text frame.
    Socket,
    /// Envelopes wrapped in custom events.
    EventChannel,
}

impl TransportKind {
    /// Returns a stable label for logs and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::EventChannel => "event-channel",
        }
    }
}

impl Default for TransportKind {
    fn default() -> Self {
        Self::Socket
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Capability to exchange JSON messages with one peer.
pub trait Transport: Send + Sync + 'static {
    /// Unique id of this connection.
    fn id(&self) -> TransportId;

    /// Which framing this transport uses.
    fn kind(&self) -> TransportKind;

    /// Queues a message for the peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the connection is gone.
    fn send(&self, message: &Value) -> Result<()>;

    /// Queues a message addressed to one host.
    ///
    /// Transports that reach exactly one peer ignore `host_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the connection is gone.
    fn send_to_host(&self, host_id: &str, message: &Value) -> Result<()> {
        let _ = host_id;
        self.send(message)
    }

    /// Installs the inbound message handler, replacing any previous one.
    fn on_message(&self, handler: MessageHandler);

    /// Removes the inbound message handler.
    fn clear_message_handler(&self);

    /// Asks the pump to close the connection.
    fn close(&self);

    /// Whether the connection has closed.
    fn is_closed(&self) -> bool;
}

// ============================================================================
// Channel
// ============================================================================

/// Shared plumbing behind both transports.
pub(crate) struct Channel {
    id: TransportId,
    outbound: mpsc::UnboundedSender<Outbound>,
    handler: Arc<Mutex<Option<MessageHandler>>>,
    closed: AtomicBool,
}

impl Channel {
    /// Creates a channel and the receiver its pump drains.
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let channel = Self {
            id: TransportId::next(),
            outbound,
            handler: Arc::new(Mutex::new(None)),
            closed: AtomicBool::new(false),
        };
        (channel, rx)
    }

    pub(crate) fn id(&self) -> TransportId {
        self.id
    }

    pub(crate) fn push_text(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        trace!(transport = %self.id, bytes = text.len(), "Queued frame");
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    pub(crate) fn set_handler(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }

    pub(crate) fn clear_handler(&self) {
        *self.handler.lock() = None;
    }

    /// Hands a decoded message to the handler.
    ///
    /// The handler is cloned out of the lock before it runs.
    pub(crate) fn dispatch(&self, message: Value) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.outbound.send(Outbound::Close);
        }
    }

    /// Marks the channel closed after the pump exits and drops the handler.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.clear_handler();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
