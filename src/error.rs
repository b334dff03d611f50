//! Error types for the rune bridge.
//!
//! This module defines all error types used throughout the crate, the
//! stable wire codes they map to, and the JSON error object returned at
//! every HTTP and envelope boundary.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use rune_bridge::{Error, Result};
//!
//! async fn example(router: &RelayRouter) -> Result<()> {
//!     let snapshot = router.get_snapshot().await?;
//!     println!("{snapshot}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Envelope | [`Error::InvalidEnvelope`], [`Error::InvalidHostId`], [`Error::UnsupportedMessageType`] |
//! | Relay | [`Error::HostUnavailable`], [`Error::RelayTimeout`], [`Error::HostDisconnected`] |
//! | Action | [`Error::ActionUnavailable`], [`Error::ActionRejected`], [`Error::InvalidActionInput`], [`Error::InvalidActionName`], [`Error::InvalidWaitInput`] |
//! | Internal | [`Error::Internal`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// ErrorCode
// ============================================================================

/// Stable machine-readable error codes used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Envelope is not a JSON object.
    InvalidEnvelopeShape,
    /// Envelope protocol name is not recognized.
    InvalidProtocol,
    /// Envelope version is not supported.
    UnsupportedProtocolVersion,
    /// Envelope request id is missing or blank.
    InvalidRequestId,
    /// Envelope type is missing or blank.
    InvalidMessageType,
    /// Envelope extensions are present but not an object.
    InvalidExtensions,
    /// Registration payload has no usable host id.
    InvalidHostId,
    /// Message type is not handled by the receiver.
    UnsupportedMessageType,
    /// No active host to relay to.
    HostUnavailable,
    /// Host did not reply in time.
    RelayTimeout,
    /// Host transport closed while a request was in flight.
    HostDisconnected,
    /// Relay path could not reach the host.
    BridgeUnavailable,
    /// Requested action has no current handler.
    ActionUnavailable,
    /// Handler declined the request.
    ActionRejected,
    /// Action input failed schema validation.
    InvalidActionInput,
    /// `invokeAction` carried no action name.
    InvalidActionName,
    /// Wait input failed shape validation.
    InvalidWaitInput,
    /// Request body is not valid JSON.
    InvalidJson,
    /// Route does not exist.
    NotFound,
    /// Route exists but not for this method.
    MethodNotAllowed,
    /// Uncaught fault.
    InternalError,
}

impl ErrorCode {
    /// Returns the wire string for this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEnvelopeShape => "invalid_envelope_shape",
            Self::InvalidProtocol => "invalid_protocol",
            Self::UnsupportedProtocolVersion => "unsupported_protocol_version",
            Self::InvalidRequestId => "invalid_request_id",
            Self::InvalidMessageType => "invalid_message_type",
            Self::InvalidExtensions => "invalid_extensions",
            Self::InvalidHostId => "invalid_host_id",
            Self::UnsupportedMessageType => "unsupported_message_type",
            Self::HostUnavailable => "host_unavailable",
            Self::RelayTimeout => "relay_timeout",
            Self::HostDisconnected => "host_disconnected",
            Self::BridgeUnavailable => "bridge_unavailable",
            Self::ActionUnavailable => "action_unavailable",
            Self::ActionRejected => "action_rejected",
            Self::InvalidActionInput => "invalid_action_input",
            Self::InvalidActionName => "invalid_action_name",
            Self::InvalidWaitInput => "invalid_wait_input",
            Self::InvalidJson => "invalid_json",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// BridgeError
// ============================================================================

/// Wire error object: `{ code, message, details? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeError {
    /// Machine-readable code.
    pub code: ErrorCode,

    /// Human-readable description.
    pub message: String,

    /// Offending value or nested error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl BridgeError {
    /// Creates a wire error without details.
    #[inline]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches details to the error.
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serializes the error to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a config struct fails validation or a service is
    /// started after disposal.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport closed; outbound frames can no longer be delivered.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Envelope Errors
    // ========================================================================
    /// Inbound envelope failed validation.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(BridgeError),

    /// Registration payload carried no usable host id.
    #[error("Invalid host id")]
    InvalidHostId,

    /// Message type not handled by the receiver.
    #[error("Unsupported message type: {message_type}")]
    UnsupportedMessageType {
        /// The unhandled type.
        message_type: String,
    },

    // ========================================================================
    // Relay Errors
    // ========================================================================
    /// No host is registered.
    #[error("No browser host is currently connected")]
    HostUnavailable,

    /// Host did not reply within the relay window.
    #[error("Timed out waiting for host response after {timeout_ms}ms")]
    RelayTimeout {
        /// The relay request id that timed out.
        request_id: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Host transport closed or was superseded while the request was in flight.
    #[error("Active host disconnected while request was in flight")]
    HostDisconnected,

    // ========================================================================
    // Action Errors
    // ========================================================================
    /// Action name has no current handler.
    #[error("Action \"{action}\" is not currently available")]
    ActionUnavailable {
        /// Requested action name.
        action: String,
    },

    /// Handler declined the request with a reason.
    #[error("{reason}")]
    ActionRejected {
        /// User-facing reason returned by the handler.
        reason: String,
    },

    /// Action input failed schema validation.
    #[error("Action input failed schema validation")]
    InvalidActionInput {
        /// Validation messages.
        errors: Vec<String>,
    },

    /// `invokeAction` without an action name.
    #[error("invokeAction requires actionName")]
    InvalidActionName,

    /// Wait input has the wrong shape.
    #[error("wait accepts optional {{ since?: integer, timeoutMs?: integer }}")]
    InvalidWaitInput,

    // ========================================================================
    // Internal Errors
    // ========================================================================
    /// Fault raised by the agent service or the bridge itself.
    #[error("{message}")]
    Internal {
        /// Description of the fault.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a relay timeout error.
    #[inline]
    pub fn relay_timeout(request_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RelayTimeout {
            request_id: request_id.into(),
            timeout_ms,
        }
    }

    /// Creates an action unavailable error.
    #[inline]
    pub fn action_unavailable(action: impl Into<String>) -> Self {
        Self::ActionUnavailable {
            action: action.into(),
        }
    }

    /// Creates an action rejected error.
    #[inline]
    pub fn action_rejected(reason: impl Into<String>) -> Self {
        Self::ActionRejected {
            reason: reason.into(),
        }
    }

    /// Creates an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// ============================================================================
// Wire Mapping
// ============================================================================

impl Error {
    /// Returns the wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidEnvelope(inner) => inner.code,
            Self::InvalidHostId => ErrorCode::InvalidHostId,
            Self::UnsupportedMessageType { .. } => ErrorCode::UnsupportedMessageType,
            Self::HostUnavailable | Self::Connection { .. } => ErrorCode::HostUnavailable,
            Self::RelayTimeout { .. } => ErrorCode::RelayTimeout,
            Self::HostDisconnected | Self::ConnectionClosed => ErrorCode::HostDisconnected,
            Self::ActionUnavailable { .. } => ErrorCode::ActionUnavailable,
            Self::ActionRejected { .. } => ErrorCode::ActionRejected,
            Self::InvalidActionInput { .. } => ErrorCode::InvalidActionInput,
            Self::InvalidActionName => ErrorCode::InvalidActionName,
            Self::InvalidWaitInput => ErrorCode::InvalidWaitInput,
            Self::Json(_) => ErrorCode::InvalidJson,
            Self::Config { .. }
            | Self::Internal { .. }
            | Self::Io(_)
            | Self::WebSocket(_) => ErrorCode::InternalError,
        }
    }

    /// Converts the error into its wire representation.
    #[must_use]
    pub fn to_bridge_error(&self) -> BridgeError {
        match self {
            Self::InvalidEnvelope(inner) => inner.clone(),
            Self::InvalidActionInput { errors } => {
                BridgeError::new(self.code(), self.to_string()).with_details(Value::from(
                    errors.iter().cloned().map(Value::String).collect::<Vec<_>>(),
                ))
            }
            _ => BridgeError::new(self.code(), self.to_string()),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RelayTimeout { .. })
    }

    /// Returns `true` if the error means the relay could not reach a host.
    #[inline]
    #[must_use]
    pub fn is_relay_failure(&self) -> bool {
        matches!(
            self,
            Self::HostUnavailable
                | Self::RelayTimeout { .. }
                | Self::HostDisconnected
                | Self::Connection { .. }
                | Self::ConnectionClosed
        )
    }

    /// Returns `true` if the caller supplied bad input.
    #[inline]
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEnvelope(_)
                | Self::InvalidHostId
                | Self::InvalidActionInput { .. }
                | Self::InvalidActionName
                | Self::InvalidWaitInput
                | Self::Json(_)
        )
    }
}

impl From<BridgeError> for Error {
    fn from(error: BridgeError) -> Self {
        Self::InvalidEnvelope(error)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_code_serializes_snake_case() {
        let value = serde_json::to_value(ErrorCode::UnsupportedProtocolVersion).expect("serialize");
        assert_eq!(value, json!("unsupported_protocol_version"));
        assert_eq!(ErrorCode::BridgeUnavailable.to_string(), "bridge_unavailable");
    }

    #[test]
    fn test_bridge_error_omits_missing_details() {
        let value = BridgeError::new(ErrorCode::NotFound, "Route not found").to_value();
        assert_eq!(value, json!({ "code": "not_found", "message": "Route not found" }));
    }

    #[test]
    fn test_rejected_message_is_reason() {
        let err = Error::action_rejected("invalid_move");
        let wire = err.to_bridge_error();
        assert_eq!(wire.code, ErrorCode::ActionRejected);
        assert_eq!(wire.message, "invalid_move");
    }

    #[test]
    fn test_invalid_input_carries_details() {
        let err = Error::InvalidActionInput {
            errors: vec!["4 is greater than the maximum of 3".into()],
        };
        let wire = err.to_bridge_error();
        assert_eq!(wire.details, Some(json!(["4 is greater than the maximum of 3"])));
    }

    #[test]
    fn test_predicates() {
        assert!(Error::relay_timeout("relay-1", 10).is_timeout());
        assert!(Error::HostUnavailable.is_relay_failure());
        assert!(Error::HostDisconnected.is_relay_failure());
        assert!(!Error::InvalidWaitInput.is_relay_failure());
        assert!(Error::InvalidWaitInput.is_validation_error());
        assert!(!Error::internal("boom").is_validation_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.code(), ErrorCode::InvalidJson);
    }
}
