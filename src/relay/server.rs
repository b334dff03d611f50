//! Relay server lifecycle.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Result;

use super::config::RelayConfig;
use super::http;
use super::router::RelayRouter;

// ============================================================================
// RelayServer
// ============================================================================

/// A bound, serving relay.
///
/// # Example
///
/// ```ignore
/// let server = RelayServer::bind(RelayConfig::new().with_port(0)).await?;
/// println!("relay at {}", server.origin());
/// server.serve(tokio::signal::ctrl_c().map(|_| ())).await?;
/// ```
pub struct RelayServer {
    router: Arc<RelayRouter>,
    local_addr: SocketAddr,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayServer {
    /// Validates `config`, binds the listener and starts serving.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Config`] if the configuration is invalid
    /// - [`crate::Error::Io`] if the address cannot be bound
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        let router = RelayRouter::new(config);
        let app = http::router(Arc::clone(&router));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "Relay server stopped with error");
            }
        });

        info!(addr = %local_addr, "Relay listening");
        Ok(Self {
            router,
            local_addr,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    /// Address the relay is bound to.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://host:port`.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Full URL of the raw socket route.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.local_addr, self.router.config().ws_path)
    }

    /// Full URL of the event channel route.
    #[must_use]
    pub fn event_channel_url(&self) -> String {
        format!(
            "ws://{}{}",
            self.local_addr,
            self.router.config().event_channel_path
        )
    }

    /// The router behind the HTTP surface.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &Arc<RelayRouter> {
        &self.router
    }

    /// Serves until `signal` resolves, then shuts down.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for parity with [`Self::bind`].
    pub async fn serve(self, signal: impl Future<Output = ()>) -> Result<()> {
        signal.await;
        self.shutdown().await;
        Ok(())
    }

    /// Fails pending relays, closes host sockets and stops the listener.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.router.shutdown();
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
            info!(addr = %self.local_addr, "Relay stopped");
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}
