//! Bridge wire protocol.
//!
//! This module defines the envelope every message travels in, the message
//! kinds exchanged between relay and host, and the snapshot shape exposed
//! to controllers.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `registerHost` | Host → Relay | Claim the active host slot |
//! | `getSnapshot` | Relay → Host | Read states and actions |
//! | `invokeAction` | Relay → Host | Run an action |
//! | `waitForChange` | Relay → Host | Long-poll for the next revision |
//! | `*Result` | Host → Relay | Correlated reply |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Envelope construction and validation |
//! | `message` | Message kinds and payloads |
//! | `snapshot` | Snapshot and action descriptor types |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope construction and validation.
pub mod envelope;

/// Message kinds and payloads.
pub mod message;

/// Snapshot types.
pub mod snapshot;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{
    Envelope, HOST_ID_EXTENSION, PROTOCOL_NAME, PROTOCOL_VERSION, create_envelope,
    has_matching_request_id, parse_envelope, validate_envelope,
};
pub use message::{
    ActionResponse, InvokeActionPayload, MessageType, RegisterHostResult, WaitRequest,
    register_host_id,
};
pub use snapshot::{
    ACTION_REQUEST_CONVENTION, ActionDescriptor, Snapshot, SnapshotLayout, StateEntry, WAIT_ACTION,
    wait_schema,
};
