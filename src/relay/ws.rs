//! Host-facing socket endpoints.
//!
//! Two upgrade routes feed the same router: the raw socket path and the
//! event channel path. Each accepted socket becomes a transport, and a pump
//! task moves frames between the socket and the transport until either side
//! closes.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::transport::{EventChannelTransport, Outbound, SocketTransport, Transport};

use super::router::RelayRouter;

// ============================================================================
// Upgrade Handlers
// ============================================================================

/// Upgrades a request on the raw socket path.
pub async fn socket_upgrade(
    State(router): State<Arc<RelayRouter>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (transport, outbound) = SocketTransport::new();
        router.attach(transport.clone());

        let inbound = Arc::clone(&transport);
        pump(socket, outbound, move |text| inbound.receive_text(text)).await;

        transport.mark_closed();
        router.disconnect(transport.id());
    })
}

/// Upgrades a request on the event channel path.
pub async fn event_channel_upgrade(
    State(router): State<Arc<RelayRouter>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (transport, outbound) = EventChannelTransport::new();
        router.attach(transport.clone());

        let inbound = Arc::clone(&transport);
        pump(socket, outbound, move |text| inbound.receive_text(text)).await;

        transport.mark_closed();
        router.disconnect(transport.id());
    })
}

// ============================================================================
// Pump
// ============================================================================

/// Moves frames between an accepted socket and a transport queue.
async fn pump(
    socket: WebSocket,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    on_text: impl Fn(&str),
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => on_text(&text),

                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => on_text(text),
                        Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                    },

                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Host socket closed");
                        break;
                    }

                    Some(Err(e)) => {
                        debug!(error = %e, "Host socket error");
                        break;
                    }

                    // Ping/Pong are answered by axum
                    Some(Ok(_)) => {}
                }
            }

            queued = outbound.recv() => {
                match queued {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            debug!(error = %e, "Failed to write to host socket");
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
