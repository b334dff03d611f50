//! Message kinds and their payloads.
//!
//! | Type | Direction | Payload |
//! |------|-----------|---------|
//! | `registerHost` | host → relay | `{ hostId }` |
//! | `registerHostResult` | relay → host | `{ accepted, reason?, activeHostId? }` |
//! | `getSnapshot` | relay → host | none |
//! | `invokeAction` | relay → host | `{ actionName, input? }` |
//! | `waitForChange` | relay → host | `{ since?, timeoutMs? }` |
//! | `*Result` | host → relay | [`ActionResponse`] |
//! | `error` | either | [`BridgeError`] |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Error, Result};

use super::snapshot::Snapshot;

// ============================================================================
// MessageType
// ============================================================================

/// Known message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Host announces itself.
    RegisterHost,
    /// Relay answers a registration.
    RegisterHostResult,
    /// Relay asks for the current snapshot.
    GetSnapshot,
    /// Host answers `getSnapshot`.
    GetSnapshotResult,
    /// Relay asks the host to run an action.
    InvokeAction,
    /// Host answers `invokeAction`.
    InvokeActionResult,
    /// Relay asks the host to long-poll for a change.
    WaitForChange,
    /// Host answers `waitForChange`.
    WaitForChangeResult,
    /// Structured failure.
    Error,
}

impl MessageType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegisterHost => "registerHost",
            Self::RegisterHostResult => "registerHostResult",
            Self::GetSnapshot => "getSnapshot",
            Self::GetSnapshotResult => "getSnapshotResult",
            Self::InvokeAction => "invokeAction",
            Self::InvokeActionResult => "invokeActionResult",
            Self::WaitForChange => "waitForChange",
            Self::WaitForChangeResult => "waitForChangeResult",
            Self::Error => "error",
        }
    }

    /// Parses a wire name; unknown names return `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "registerHost" => Self::RegisterHost,
            "registerHostResult" => Self::RegisterHostResult,
            "getSnapshot" => Self::GetSnapshot,
            "getSnapshotResult" => Self::GetSnapshotResult,
            "invokeAction" => Self::InvokeAction,
            "invokeActionResult" => Self::InvokeActionResult,
            "waitForChange" => Self::WaitForChange,
            "waitForChangeResult" => Self::WaitForChangeResult,
            "error" => Self::Error,
            _ => return None,
        })
    }

    /// Returns the reply type for a request type.
    #[must_use]
    pub const fn reply(self) -> Self {
        match self {
            Self::RegisterHost => Self::RegisterHostResult,
            Self::GetSnapshot => Self::GetSnapshotResult,
            Self::InvokeAction => Self::InvokeActionResult,
            Self::WaitForChange => Self::WaitForChangeResult,
            other => other,
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Extracts a usable host id from a `registerHost` payload.
///
/// Returns `None` when the payload is missing, not an object, or carries a
/// blank or non-string `hostId`.
#[must_use]
pub fn register_host_id(payload: Option<&Value>) -> Option<String> {
    payload
        .and_then(|p| p.get("hostId"))
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
}

/// Payload of `registerHostResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterHostResult {
    /// Whether the registration took effect.
    pub accepted: bool,

    /// Why the registration was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Host id the relay now considers active.
    #[serde(
        rename = "activeHostId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub active_host_id: Option<String>,
}

impl RegisterHostResult {
    /// Accepted registration.
    #[must_use]
    pub fn accepted(active_host_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reason: None,
            active_host_id: Some(active_host_id.into()),
        }
    }

    /// Refused registration.
    #[must_use]
    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
            active_host_id: None,
        }
    }

    /// Lenient parse used by hosts; anything malformed reads as refused.
    #[must_use]
    pub fn from_payload(payload: Option<&Value>) -> Self {
        payload
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .unwrap_or(Self {
                accepted: false,
                reason: None,
                active_host_id: None,
            })
    }
}

// ============================================================================
// InvokeAction
// ============================================================================

/// Payload of `invokeAction`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvokeActionPayload {
    /// Action to run.
    #[serde(rename = "actionName", default)]
    pub action_name: String,

    /// Raw input value; absent means no input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl InvokeActionPayload {
    /// Creates a payload.
    pub fn new(action_name: impl Into<String>, input: Option<Value>) -> Self {
        Self {
            action_name: action_name.into(),
            input,
        }
    }

    /// Lenient parse; a missing or non-string action name becomes empty.
    #[must_use]
    pub fn from_payload(payload: Option<&Value>) -> Self {
        let action_name = payload
            .and_then(|p| p.get("actionName"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let input = payload
            .and_then(|p| p.get("input"))
            .filter(|v| !v.is_null())
            .cloned();
        Self { action_name, input }
    }
}

// ============================================================================
// WaitRequest
// ============================================================================

/// Validated `wait` / `waitForChange` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRequest {
    /// Revision the caller last saw; `None` means "the current one".
    pub since: Option<u64>,
    /// How long to wait, already clamped to the configured maximum.
    pub timeout: Duration,
}

impl WaitRequest {
    /// Validates wait input.
    ///
    /// - absent or `null` input: wait up to `max_wait` from the current revision
    /// - `since`: optional non-negative integer
    /// - `timeoutMs`: any finite number is clamped to `[0, max_wait]`;
    ///   anything else falls back to `max_wait`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWaitInput`] for non-object input or a bad `since`.
    pub fn parse(input: Option<&Value>, max_wait: Duration) -> Result<Self> {
        let object = match input {
            None | Some(Value::Null) => {
                return Ok(Self {
                    since: None,
                    timeout: max_wait,
                });
            }
            Some(Value::Object(object)) => object,
            Some(_) => return Err(Error::InvalidWaitInput),
        };

        let since = match object.get("since") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().ok_or(Error::InvalidWaitInput)?),
        };

        Ok(Self {
            since,
            timeout: clamp_timeout(object.get("timeoutMs"), max_wait),
        })
    }
}

/// Clamps a `timeoutMs` value to `[0, max_wait]`, defaulting to `max_wait`.
#[must_use]
pub fn clamp_timeout(value: Option<&Value>, max_wait: Duration) -> Duration {
    let max_ms = max_wait.as_millis() as f64;
    match value.and_then(Value::as_f64).filter(|ms| ms.is_finite()) {
        Some(ms) => Duration::from_millis(ms.clamp(0.0, max_ms) as u64),
        None => max_wait,
    }
}

// ============================================================================
// ActionResponse
// ============================================================================

/// Body shared by host replies and HTTP responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Whether the operation succeeded.
    pub ok: bool,

    /// Set on wait responses only.
    #[serde(rename = "timedOut", default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,

    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BridgeError>,

    /// Snapshot at reply time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Arc<Snapshot>>,
}

impl ActionResponse {
    /// Successful response carrying a snapshot.
    #[must_use]
    pub fn success(snapshot: Arc<Snapshot>) -> Self {
        Self {
            ok: true,
            timed_out: None,
            error: None,
            snapshot: Some(snapshot),
        }
    }

    /// Wait response.
    #[must_use]
    pub fn waited(timed_out: bool, snapshot: Arc<Snapshot>) -> Self {
        Self {
            ok: true,
            timed_out: Some(timed_out),
            error: None,
            snapshot: Some(snapshot),
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failure(error: BridgeError, snapshot: Option<Arc<Snapshot>>) -> Self {
        Self {
            ok: false,
            timed_out: None,
            error: Some(error),
            snapshot,
        }
    }

    /// Serializes the response to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    const MAX: Duration = Duration::from_secs(30);

    #[test]
    fn test_message_type_round_trip_names() {
        for kind in [
            MessageType::RegisterHost,
            MessageType::GetSnapshot,
            MessageType::InvokeAction,
            MessageType::WaitForChange,
            MessageType::Error,
        ] {
            assert_eq!(MessageType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageType::parse("launchMissiles"), None);
        assert_eq!(MessageType::GetSnapshot.reply(), MessageType::GetSnapshotResult);
    }

    #[test]
    fn test_register_host_id() {
        assert_eq!(register_host_id(Some(&json!({ "hostId": "tab-1" }))), Some("tab-1".into()));
        assert_eq!(register_host_id(Some(&json!({ "hostId": "  " }))), None);
        assert_eq!(register_host_id(Some(&json!({ "hostId": 5 }))), None);
        assert_eq!(register_host_id(None), None);
    }

    #[test]
    fn test_register_result_wire_shape() {
        let value = serde_json::to_value(RegisterHostResult::refused("invalid_host_id")).expect("ser");
        assert_eq!(value, json!({ "accepted": false, "reason": "invalid_host_id" }));

        let parsed = RegisterHostResult::from_payload(Some(&json!({
            "accepted": true,
            "activeHostId": "tab-2"
        })));
        assert_eq!(parsed, RegisterHostResult::accepted("tab-2"));

        assert!(!RegisterHostResult::from_payload(Some(&json!("nope"))).accepted);
    }

    #[test]
    fn test_invoke_payload_lenient_parse() {
        let parsed = InvokeActionPayload::from_payload(Some(&json!({ "actionName": "move", "input": 4 })));
        assert_eq!(parsed, InvokeActionPayload::new("move", Some(json!(4))));

        let parsed = InvokeActionPayload::from_payload(Some(&json!({ "actionName": 4 })));
        assert!(parsed.action_name.is_empty());
        assert!(parsed.input.is_none());
    }

    #[test]
    fn test_wait_defaults() {
        let request = WaitRequest::parse(None, MAX).expect("valid");
        assert_eq!(request, WaitRequest { since: None, timeout: MAX });
    }

    #[test]
    fn test_wait_clamps_timeout() {
        let request = WaitRequest::parse(Some(&json!({ "since": 2, "timeoutMs": 120_000 })), MAX)
            .expect("valid");
        assert_eq!(request.since, Some(2));
        assert_eq!(request.timeout, MAX);

        let request = WaitRequest::parse(Some(&json!({ "timeoutMs": -5 })), MAX).expect("valid");
        assert_eq!(request.timeout, Duration::ZERO);

        let request = WaitRequest::parse(Some(&json!({ "timeoutMs": "soon" })), MAX).expect("valid");
        assert_eq!(request.timeout, MAX);
    }

    #[test]
    fn test_wait_rejects_bad_shapes() {
        for bad in [json!(5), json!("x"), json!({ "since": -1 }), json!({ "since": 1.5 })] {
            let err = WaitRequest::parse(Some(&bad), MAX).expect_err("invalid");
            assert!(matches!(err, Error::InvalidWaitInput));
        }
    }
}
