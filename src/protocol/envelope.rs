//! Envelope codec.
//!
//! Every message exchanged between the relay and a host is an [`Envelope`].
//! This module constructs envelopes and validates untrusted JSON into them.
//! Nothing here performs I/O.
//!
//! # Format
//!
//! ```json
//! {
//!   "protocol": "rune-dev-bridge",
//!   "version": 1,
//!   "requestId": "relay-1",
//!   "type": "getSnapshot",
//!   "payload": { ... },
//!   "extensions": { "hostId": "..." }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, ErrorCode};

// ============================================================================
// Constants
// ============================================================================

/// Protocol name stamped on every envelope.
pub const PROTOCOL_NAME: &str = "rune-dev-bridge";

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: u64 = 1;

/// Extension key carrying the sender's host id.
pub const HOST_ID_EXTENSION: &str = "hostId";

// ============================================================================
// Envelope
// ============================================================================

/// The single message wrapper exchanged between controller and host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Always [`PROTOCOL_NAME`].
    pub protocol: String,

    /// Always [`PROTOCOL_VERSION`].
    pub version: u64,

    /// Caller-chosen correlation id.
    #[serde(rename = "requestId")]
    pub request_id: String,

    /// Message kind, e.g. `getSnapshot`.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Message-specific body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Open metadata map; unknown keys are preserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl Envelope {
    /// Creates an envelope stamped with the protocol constants.
    #[inline]
    #[must_use]
    pub fn new(request_id: impl Into<String>, message_type: impl Into<String>) -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION,
            request_id: request_id.into(),
            message_type: message_type.into(),
            payload: None,
            extensions: None,
        }
    }

    /// Sets the payload.
    #[inline]
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Replaces the extensions map.
    #[inline]
    #[must_use]
    pub fn with_extensions(mut self, extensions: Map<String, Value>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Adds the `hostId` extension, keeping any other keys.
    #[must_use]
    pub fn with_host_id(mut self, host_id: impl Into<String>) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert(HOST_ID_EXTENSION.to_string(), Value::String(host_id.into()));
        self
    }

    /// Returns the `hostId` extension when it is a string.
    #[inline]
    #[must_use]
    pub fn host_id(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get(HOST_ID_EXTENSION))
            .and_then(Value::as_str)
    }

    /// Serializes the envelope to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Creates an envelope; the functional form of [`Envelope::new`].
#[must_use]
pub fn create_envelope(
    request_id: impl Into<String>,
    message_type: impl Into<String>,
    payload: Option<Value>,
    extensions: Option<Map<String, Value>>,
) -> Envelope {
    Envelope {
        payload,
        extensions,
        ..Envelope::new(request_id, message_type)
    }
}

// ============================================================================
// Validation
// ============================================================================

fn fail(code: ErrorCode, message: &str, offending: Option<&Value>) -> BridgeError {
    let error = BridgeError::new(code, message);
    match offending {
        Some(value) => error.with_details(value.clone()),
        None => error,
    }
}

fn non_blank_string(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Validates an untrusted JSON value into an [`Envelope`].
///
/// Checks run in a fixed order and the first failure wins. On success the
/// protocol and version are rewritten to the canonical constants; payload
/// and extensions pass through untouched.
///
/// # Errors
///
/// Returns a [`BridgeError`] whose code names the failed check and whose
/// `details` carry the offending value when there is one.
pub fn validate_envelope(raw: &Value) -> Result<Envelope, BridgeError> {
    let Some(object) = raw.as_object() else {
        return Err(fail(
            ErrorCode::InvalidEnvelopeShape,
            "Bridge envelope must be an object",
            None,
        ));
    };

    let protocol = object.get("protocol");
    if protocol.and_then(Value::as_str) != Some(PROTOCOL_NAME) {
        return Err(fail(
            ErrorCode::InvalidProtocol,
            "Bridge protocol name is not recognized",
            protocol,
        ));
    }

    let version = object.get("version");
    if version.and_then(Value::as_f64) != Some(PROTOCOL_VERSION as f64) {
        return Err(fail(
            ErrorCode::UnsupportedProtocolVersion,
            "Bridge protocol version is not supported",
            version,
        ));
    }

    let request_id = object.get("requestId");
    let Some(request_id) = non_blank_string(request_id) else {
        return Err(fail(
            ErrorCode::InvalidRequestId,
            "Bridge envelope requestId must be a non-empty string",
            request_id,
        ));
    };

    let message_type = object.get("type");
    let Some(message_type) = non_blank_string(message_type) else {
        return Err(fail(
            ErrorCode::InvalidMessageType,
            "Bridge envelope type must be a non-empty string",
            message_type,
        ));
    };

    let extensions = match object.get("extensions") {
        None => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(other) => {
            return Err(fail(
                ErrorCode::InvalidExtensions,
                "Bridge envelope extensions must be an object when provided",
                Some(other),
            ));
        }
    };

    Ok(Envelope {
        protocol: PROTOCOL_NAME.to_string(),
        version: PROTOCOL_VERSION,
        request_id: request_id.to_string(),
        message_type: message_type.to_string(),
        payload: object.get("payload").cloned(),
        extensions,
    })
}

/// Parses JSON text and validates it as an envelope.
///
/// # Errors
///
/// Unparseable text fails with `invalid_envelope_shape`; otherwise as
/// [`validate_envelope`].
pub fn parse_envelope(text: &str) -> Result<Envelope, BridgeError> {
    let raw: Value = serde_json::from_str(text).map_err(|e| {
        BridgeError::new(
            ErrorCode::InvalidEnvelopeShape,
            format!("Bridge envelope is not valid JSON: {e}"),
        )
    })?;
    validate_envelope(&raw)
}

/// Returns `true` iff both envelopes carry the same request id.
#[inline]
#[must_use]
pub fn has_matching_request_id(request: &Envelope, response: &Envelope) -> bool {
    request.request_id == response.request_id
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    fn valid_raw() -> Value {
        json!({
            "protocol": PROTOCOL_NAME,
            "version": 1,
            "requestId": "relay-1",
            "type": "getSnapshot"
        })
    }

    fn code_of(raw: Value) -> ErrorCode {
        validate_envelope(&raw).expect_err("should fail").code
    }

    #[test]
    fn test_create_stamps_constants() {
        let envelope = create_envelope("r-1", "getSnapshot", None, None);
        assert_eq!(envelope.protocol, PROTOCOL_NAME);
        assert_eq!(envelope.version, PROTOCOL_VERSION);
        assert_eq!(
            envelope.to_value(),
            json!({
                "protocol": "rune-dev-bridge",
                "version": 1,
                "requestId": "r-1",
                "type": "getSnapshot"
            })
        );
    }

    #[test]
    fn test_validation_order() {
        assert_eq!(code_of(json!([1, 2])), ErrorCode::InvalidEnvelopeShape);
        assert_eq!(code_of(json!(null)), ErrorCode::InvalidEnvelopeShape);

        // Protocol is checked before everything else, even a bad version.
        assert_eq!(
            code_of(json!({ "protocol": "other", "version": 9 })),
            ErrorCode::InvalidProtocol
        );
        assert_eq!(
            code_of(json!({ "protocol": PROTOCOL_NAME, "version": 2, "requestId": "" })),
            ErrorCode::UnsupportedProtocolVersion
        );

        let mut raw = valid_raw();
        raw["requestId"] = json!("   ");
        assert_eq!(code_of(raw), ErrorCode::InvalidRequestId);

        let mut raw = valid_raw();
        raw["type"] = json!(7);
        assert_eq!(code_of(raw), ErrorCode::InvalidMessageType);

        let mut raw = valid_raw();
        raw["extensions"] = json!(["hostId"]);
        assert_eq!(code_of(raw), ErrorCode::InvalidExtensions);
    }

    #[test]
    fn test_version_failure_carries_offending_value() {
        let mut raw = valid_raw();
        raw["version"] = json!("1");
        let error = validate_envelope(&raw).expect_err("string version");
        assert_eq!(error.code, ErrorCode::UnsupportedProtocolVersion);
        assert_eq!(error.details, Some(json!("1")));
    }

    #[test]
    fn test_unknown_extensions_preserved() {
        let mut raw = valid_raw();
        raw["extensions"] = json!({ "hostId": "tab-1", "traceparent": "00-abc" });
        raw["payload"] = json!({ "anything": [1, 2, 3] });

        let envelope = validate_envelope(&raw).expect("valid");
        assert_eq!(envelope.host_id(), Some("tab-1"));
        assert_eq!(
            envelope.extensions.as_ref().and_then(|e| e.get("traceparent")),
            Some(&json!("00-abc"))
        );
        assert_eq!(envelope.payload, Some(json!({ "anything": [1, 2, 3] })));
    }

    #[test]
    fn test_with_host_id_keeps_other_keys() {
        let mut extensions = Map::new();
        extensions.insert("trace".into(), json!(1));
        let envelope = Envelope::new("r", "t")
            .with_extensions(extensions)
            .with_host_id("tab-9");
        assert_eq!(envelope.host_id(), Some("tab-9"));
        assert_eq!(envelope.extensions.as_ref().map(Map::len), Some(2));
    }

    #[test]
    fn test_parse_envelope_rejects_bad_json() {
        let error = parse_envelope("{not json").expect_err("bad json");
        assert_eq!(error.code, ErrorCode::InvalidEnvelopeShape);
    }

    #[test]
    fn test_matching_request_id() {
        let a = Envelope::new("relay-1", "getSnapshot");
        let b = Envelope::new("relay-1", "getSnapshotResult");
        let c = Envelope::new("relay-2", "getSnapshotResult");
        assert!(has_matching_request_id(&a, &b));
        assert!(!has_matching_request_id(&a, &c));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ];
        leaf.prop_recursive(2, 8, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            request_id in "[a-zA-Z0-9-]{1,16}",
            message_type in "[a-zA-Z]{1,16}",
            payload in prop::option::of(arb_json()),
            extensions in prop::option::of(prop::collection::btree_map("[a-zA-Z]{1,8}", arb_json(), 0..4)),
        ) {
            let extensions = extensions.map(|m| m.into_iter().collect::<Map<String, Value>>());
            let original = create_envelope(request_id, message_type, payload, extensions);
            let validated = validate_envelope(&original.to_value()).expect("round trip");
            prop_assert_eq!(validated, original);
        }

        #[test]
        fn prop_wrong_version_rejected(version in any::<i64>().prop_filter("not supported", |v| *v != 1)) {
            let mut raw = valid_raw();
            raw["version"] = json!(version);
            let error = validate_envelope(&raw).expect_err("unsupported");
            prop_assert_eq!(error.code, ErrorCode::UnsupportedProtocolVersion);
            prop_assert_eq!(error.details, Some(json!(version)));
        }

        #[test]
        fn prop_matching_iff_equal(a in "[a-z0-9]{1,6}", b in "[a-z0-9]{1,6}") {
            let left = Envelope::new(a.clone(), "x");
            let right = Envelope::new(b.clone(), "y");
            prop_assert_eq!(has_matching_request_id(&left, &right), a == b);
        }
    }
}
