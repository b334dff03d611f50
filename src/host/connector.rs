//! Host-side socket connection.
//!
//! Dials the relay with tokio-tungstenite, wraps the socket in the chosen
//! transport, and spawns a pump that runs until either side closes.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::{EventChannelTransport, Outbound, SocketTransport, Transport, TransportKind};

// ============================================================================
// HostConnection
// ============================================================================

/// Live connection to the relay.
pub(crate) struct HostConnection {
    /// Transport to register handlers on and send through.
    pub(crate) transport: Arc<dyn Transport>,
    /// Resolves when the pump exits.
    pub(crate) closed: oneshot::Receiver<()>,
}

/// Concrete transport, kept for inbound decoding.
#[derive(Clone)]
enum Inbound {
    Socket(Arc<SocketTransport>),
    EventChannel(Arc<EventChannelTransport>),
}

impl Inbound {
    fn receive_text(&self, text: &str) {
        match self {
            Self::Socket(t) => t.receive_text(text),
            Self::EventChannel(t) => t.receive_text(text),
        }
    }

    fn mark_closed(&self) {
        match self {
            Self::Socket(t) => t.mark_closed(),
            Self::EventChannel(t) => t.mark_closed(),
        }
    }
}

// ============================================================================
// Connect
// ============================================================================

/// Opens a connection to `url` using `kind` framing.
///
/// Event channel transports only accept frames addressed to `host_id`.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the handshake fails.
pub(crate) async fn connect(url: &Url, kind: TransportKind, host_id: &str) -> Result<HostConnection> {
    let (stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| Error::connection(format!("{url}: {e}")))?;
    debug!(%url, kind = %kind, "Connected to relay");

    let (transport, inbound, outbound) = match kind {
        TransportKind::Socket => {
            let (transport, outbound) = SocketTransport::new();
            let shared: Arc<dyn Transport> = transport.clone();
            (shared, Inbound::Socket(transport), outbound)
        }
        TransportKind::EventChannel => {
            let (transport, outbound) = EventChannelTransport::new();
            transport.set_local_host_id(host_id);
            let shared: Arc<dyn Transport> = transport.clone();
            (shared, Inbound::EventChannel(transport), outbound)
        }
    };

    let (closed_tx, closed) = oneshot::channel();
    tokio::spawn(async move {
        pump(stream, outbound, &inbound).await;
        inbound.mark_closed();
        let _ = closed_tx.send(());
    });

    Ok(HostConnection { transport, closed })
}

// ============================================================================
// Pump
// ============================================================================

async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: &Inbound,
) {
    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => inbound.receive_text(text.as_str()),

                    Some(Ok(Message::Binary(bytes))) => {
                        if let Ok(text) = std::str::from_utf8(&bytes) {
                            inbound.receive_text(text);
                        }
                    }

                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Relay closed the connection");
                        break;
                    }

                    Some(Err(e)) => {
                        debug!(error = %e, "Relay connection error");
                        break;
                    }

                    // Ping/Pong handled by tungstenite
                    Some(Ok(_)) => {}
                }
            }

            queued = outbound.recv() => {
                match queued {
                    Some(Outbound::Text(text)) => {
                        trace!(bytes = text.len(), "Sending frame");
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }

                    Some(Outbound::Close) | None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        }
    }
}
