//! Controller-facing HTTP routes.
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `{host_status_path}` | `GET` | `{ ok, host: { connected, hostId } }` |
//! | `{api_path}` | `GET` | host's `getSnapshotResult` payload |
//! | `{api_path}/actions/<name>` | `POST`, `GET ?post` | host's result payload |
//! | `{ws_path}` | upgrade | raw socket host transport |
//! | `{event_channel_path}` | upgrade | event channel host transport |
//!
//! Host payloads are returned verbatim with 200. When the relay itself
//! fails the response is 503 `bridge_unavailable` with the relay error in
//! `details`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{BridgeError, Error, ErrorCode};

use super::router::RelayRouter;
use super::ws::{event_channel_upgrade, socket_upgrade};

// ============================================================================
// Router
// ============================================================================

/// Builds the relay's axum router.
pub fn router(relay: Arc<RelayRouter>) -> Router {
    let config = relay.config().clone();
    Router::new()
        .route(&config.host_status_path, get(host_status))
        .route(&config.api_path, get(snapshot))
        .route(&config.ws_path, get(socket_upgrade))
        .route(&config.event_channel_path, get(event_channel_upgrade))
        .fallback(actions)
        .with_state(relay)
}

// ============================================================================
// Handlers
// ============================================================================

async fn host_status(State(relay): State<Arc<RelayRouter>>) -> Response {
    Json(json!({ "ok": true, "host": relay.host_status() })).into_response()
}

async fn snapshot(State(relay): State<Arc<RelayRouter>>) -> Response {
    match relay.get_snapshot().await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => bridge_unavailable(&e),
    }
}

async fn actions(
    State(relay): State<Arc<RelayRouter>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let prefix = relay.config().actions_prefix();
    let Some(raw_name) = uri.path().strip_prefix(prefix.as_str()) else {
        return error_response(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Route not found");
    };

    let name = urlencoding::decode(raw_name)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| raw_name.to_string());
    if name.is_empty() {
        return error_response(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Missing action name");
    }

    let input = if method == Method::POST {
        match parse_body(&body) {
            Ok(input) => input,
            Err(message) => {
                return error_response(StatusCode::BAD_REQUEST, ErrorCode::InvalidJson, message);
            }
        }
    } else if method == Method::GET {
        match post_query(uri.query()) {
            Some(value) => parse_post_value(&value),
            None => {
                return error_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    ErrorCode::MethodNotAllowed,
                    "Use POST or GET with ?post or ?post=<value> to invoke actions",
                );
            }
        }
    } else {
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::MethodNotAllowed,
            "Use POST or GET with ?post or ?post=<value>",
        );
    };

    debug!(action = %name, has_input = input.is_some(), "Relaying action");
    match relay.invoke_action(&name, input).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => bridge_unavailable(&e),
    }
}

// ============================================================================
// Request Parsing
// ============================================================================

/// Parses a request body; blank means no input.
fn parse_body(body: &[u8]) -> Result<Option<Value>, String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| e.to_string())
}

/// Returns the `post` query value; a bare `?post` yields an empty string.
fn post_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "post")
        .map(|(_, value)| value.into_owned())
}

/// `?post=` values are JSON when they parse and plain strings otherwise.
fn parse_post_value(value: &str) -> Option<Value> {
    if value.is_empty() {
        return None;
    }
    Some(serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string())))
}

// ============================================================================
// Responses
// ============================================================================

fn error_response(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    let error = BridgeError::new(code, message);
    (status, Json(json!({ "ok": false, "error": error }))).into_response()
}

fn bridge_unavailable(cause: &Error) -> Response {
    debug!(error = %cause, "Relay failed");
    let error = BridgeError::new(
        ErrorCode::BridgeUnavailable,
        "Unable to relay request to browser host",
    )
    .with_details(cause.to_bridge_error().to_value());
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "ok": false, "error": error })),
    )
        .into_response()
}

// ============================================================================
// Tests
// ============================================================================
