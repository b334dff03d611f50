//! Standalone long-poll HTTP service.
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `{base}` | `GET` | `{ ok, snapshot }` |
//! | `{ui}` | `GET` | HTML console when enabled, 404 otherwise |
//! | `{base}/actions/wait` | `POST` | `{ ok, timedOut, snapshot }` |
//! | `{base}/actions/<name>` | `POST` | `{ ok, snapshot }` or `{ ok: false, error, snapshot }` |
//!
//! Every handler waits for the service's first emission before answering.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Error, ErrorCode, Result};
use crate::protocol::{ActionResponse, SnapshotLayout, WAIT_ACTION};
use crate::service::{AgentService, RevisionTracker, Subscription, invoke};

use super::config::ServiceConfig;
use super::ui::{DEFAULT_TITLE, render_console};

// ============================================================================
// ServiceInfo
// ============================================================================

/// Where the service is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Bind host.
    pub host: String,
    /// Bound port; the real one once started.
    pub port: u16,
    /// Normalized base path.
    pub base_path: String,
    /// `http://host:port`.
    pub origin: String,
    /// URL of the snapshot route, always ending in `/`.
    pub url: String,
}

impl ServiceInfo {
    fn new(host: &str, port: u16, base_path: &str) -> Self {
        let origin = format!("http://{host}:{port}");
        let url = if base_path == "/" {
            format!("{origin}/")
        } else {
            format!("{origin}{base_path}/")
        };
        Self {
            host: host.to_string(),
            port,
            base_path: base_path.to_string(),
            origin,
            url,
        }
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// State handed to every request handler.
struct ServiceState {
    service: Arc<dyn AgentService>,
    tracker: Arc<RevisionTracker>,
    base_path: String,
    ui_path: String,
    actions_base_path: String,
    config: ServiceConfig,
}

impl ServiceState {
    fn is_root(&self, path: &str) -> bool {
        path == self.base_path || (self.base_path != "/" && path == format!("{}/", self.base_path))
    }
}

/// A listener that is currently serving.
struct Running {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

// ============================================================================
// AgentHttpService
// ============================================================================

/// Serves an [`AgentService`] directly over HTTP with long-poll `wait`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use rune_bridge::service::counter_service;
/// use rune_bridge::standalone::{AgentHttpService, ServiceConfig};
///
/// # async fn run() -> rune_bridge::Result<()> {
/// let http = AgentHttpService::new(Arc::new(counter_service()), ServiceConfig::new().with_port(0));
/// let info = http.start().await?;
/// println!("serving at {}", info.url);
/// http.dispose().await;
/// # Ok(())
/// # }
/// ```
pub struct AgentHttpService {
    state: Arc<ServiceState>,
    subscription: Mutex<Subscription>,
    running: AsyncMutex<Option<Running>>,
    info: Mutex<ServiceInfo>,
    serving: AtomicBool,
    disposed: AtomicBool,
}

impl AgentHttpService {
    /// Subscribes to `service`. Does not bind until [`Self::start`].
    #[must_use]
    pub fn new(service: Arc<dyn AgentService>, config: ServiceConfig) -> Self {
        let base_path = config.base_path();
        let actions_base_path = config.actions_base_path();
        let layout = SnapshotLayout::new(actions_base_path.clone(), config.max_wait);
        let tracker = RevisionTracker::new(layout, service.description());
        let subscription = service.observe(tracker.observer());
        let info = ServiceInfo::new(&config.host, config.port, &base_path);

        let state = Arc::new(ServiceState {
            service,
            tracker,
            ui_path: config.ui_path(),
            base_path,
            actions_base_path,
            config,
        });

        Self {
            state,
            subscription: Mutex::new(subscription),
            running: AsyncMutex::new(None),
            info: Mutex::new(info),
            serving: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Router serving this service, for embedding into another axum app.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(Arc::clone(&self.state))
    }

    /// Current address information.
    #[must_use]
    pub fn info(&self) -> ServiceInfo {
        self.info.lock().clone()
    }

    /// Whether a listener is serving.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    /// Current revision of the hosted service.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state.tracker.revision()
    }

    /// Binds and starts serving. Returns the existing info when already running.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] after [`Self::dispose`] or for an invalid config
    /// - [`Error::Io`] if the address cannot be bound
    pub async fn start(&self) -> Result<ServiceInfo> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(self.info());
        }
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::config("Service has been disposed"));
        }
        self.state.config.validate()?;

        let listener = TcpListener::bind(self.state.config.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        let app = self.router();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "Agent HTTP service stopped with error");
            }
        });

        let info = ServiceInfo::new(&self.state.config.host, local_addr.port(), &self.state.base_path);
        *self.info.lock() = info.clone();
        *running = Some(Running {
            local_addr,
            shutdown_tx,
            task,
        });
        self.serving.store(true, Ordering::SeqCst);

        info!(addr = %local_addr, url = %info.url, "Agent HTTP service listening");
        Ok(info)
    }

    /// Stops the listener and waits for in-flight requests. Does nothing when
    /// not running.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        self.serving.store(false, Ordering::SeqCst);
        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.task.await {
            warn!(error = %e, "Agent HTTP service task panicked");
        }
        info!(addr = %running.local_addr, "Agent HTTP service stopped");
    }

    /// Stops, releases pending waits as timed out and detaches from the
    /// service. The service cannot be started again.
    pub async fn dispose(&self) {
        // Waits must be released first or graceful shutdown blocks on them.
        self.state.tracker.close();
        self.stop().await;
        self.subscription.lock().unsubscribe();
        self.disposed.store(true, Ordering::SeqCst);
        debug!("Agent HTTP service disposed");
    }
}

impl Drop for AgentHttpService {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.shutdown_tx.send(());
        }
        self.state.tracker.close();
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn dispatch(
    State(state): State<Arc<ServiceState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path();

    if method == Method::GET && state.is_root(path) {
        return match state.tracker.ready().await {
            Ok(snapshot) => json_response(StatusCode::OK, ActionResponse::success(snapshot).to_value()),
            Err(e) => failure(&state, &e),
        };
    }

    if method == Method::GET && path == state.ui_path {
        if !state.config.enable_ui {
            return not_found("Route not found");
        }
        return (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            render_console(&state.base_path, DEFAULT_TITLE),
        )
            .into_response();
    }

    if method == Method::POST
        && let Some(raw_name) = path.strip_prefix(state.actions_base_path.as_str())
    {
        let name = urlencoding::decode(raw_name)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| raw_name.to_string());
        if name.is_empty() {
            return not_found("Missing action name");
        }
        return match parse_body(&body) {
            Ok(input) => action(&state, &name, input).await,
            Err(message) => {
                let error = BridgeError::new(ErrorCode::InvalidJson, message);
                json_response(StatusCode::BAD_REQUEST, json!({ "ok": false, "error": error }))
            }
        };
    }

    not_found("Route not found")
}

async fn action(state: &ServiceState, name: &str, input: Option<Value>) -> Response {
    if name == WAIT_ACTION {
        return match invoke::wait_for_change(&state.tracker, input.as_ref(), state.config.max_wait).await {
            Ok(response) => json_response(StatusCode::OK, response.to_value()),
            Err(e) => failure(state, &e),
        };
    }

    let result = invoke::invoke_action(state.service.as_ref(), &state.tracker, name, input).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    json_response(status, invoke::respond(result, &state.tracker).to_value())
}

// ============================================================================
// Request Parsing
// ============================================================================

/// Parses a request body; blank means no input.
fn parse_body(body: &[u8]) -> std::result::Result<Option<Value>, String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text).map(Some).map_err(|e| e.to_string())
}

// ============================================================================
// Responses
// ============================================================================

/// HTTP status for an action failure.
fn status_for(error: &Error) -> StatusCode {
    match error.code() {
        ErrorCode::ActionUnavailable | ErrorCode::ActionRejected => StatusCode::CONFLICT,
        ErrorCode::InvalidActionInput
        | ErrorCode::InvalidActionName
        | ErrorCode::InvalidWaitInput
        | ErrorCode::InvalidJson => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(state: &ServiceState, error: &Error) -> Response {
    let body = ActionResponse::failure(error.to_bridge_error(), state.tracker.snapshot());
    json_response(status_for(error), body.to_value())
}

fn not_found(message: &str) -> Response {
    let error = BridgeError::new(ErrorCode::NotFound, message);
    json_response(StatusCode::NOT_FOUND, json!({ "ok": false, "error": error }))
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

// ============================================================================
// Tests
// ============================================================================
