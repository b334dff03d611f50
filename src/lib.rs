//! Rune Bridge - development-time relay between HTTP agents and a browser-hosted agent service.
//!
//! An agent service exposes named states and actions. This crate lets an
//! HTTP client (an LLM agent, a script, `curl`) read the service's snapshot,
//! invoke its actions and long-poll for changes, while the service itself
//! lives somewhere else: in a browser tab reached through a relay, or in the
//! same process behind a standalone HTTP server.
//!
//! # Architecture
//!
//! ```text
//!  HTTP client ──► RelayServer ──(WebSocket)──► HostRuntime ──► AgentService
//!                  (relay)                      (host)
//!
//!  HTTP client ──► AgentHttpService ──────────────────────────► AgentService
//!                  (standalone)
//! ```
//!
//! Key design principles:
//!
//! - Every message between relay and host is one [`protocol::Envelope`]
//! - The relay keeps exactly one active host; the newest registration wins
//! - Each relayed request resolves exactly once: reply, timeout or disconnect
//! - Snapshot revisions advance only when the service's view changes
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rune_bridge::{HostConfig, HostRuntime, RelayConfig, RelayServer, Result};
//! use rune_bridge::service::counter_service;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let relay = RelayServer::bind(RelayConfig::new().with_port(0)).await?;
//!
//!     let config = HostConfig::new().with_relay_origin(relay.origin());
//!     let host = HostRuntime::start(Arc::new(counter_service()), config)?;
//!
//!     // GET {origin}/__rune_bridge now returns the counter snapshot.
//!     println!("relay at {}", relay.origin());
//!
//!     host.stop().await;
//!     relay.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types, wire errors and [`Result`] alias |
//! | [`identifiers`] | Transport, host and request ids |
//! | [`protocol`] | Envelope codec, message payloads, snapshots |
//! | [`service`] | Agent service seam, revision tracking, dispatch |
//! | [`transport`] | Raw socket and event channel framing |
//! | [`relay`] | Controller-side relay server |
//! | [`host`] | Browser host runtime and activation |
//! | [`standalone`] | Agent service served directly over HTTP |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire protocol: envelopes, payloads and snapshots.
pub mod protocol;

/// Agent service abstraction and the revision tracker.
pub mod service;

/// Message transports between relay and host.
pub mod transport;

/// Relay server.
pub mod relay;

/// Host runtime.
pub mod host;

/// Standalone long-poll HTTP service.
pub mod standalone;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{BridgeError, Error, ErrorCode, Result};

// Protocol types
pub use protocol::{ActionResponse, Envelope, MessageType, Snapshot};

// Service types
pub use service::{ActionOutcome, ActionSpec, AgentService, InMemoryService, ServiceView, Subscription};

// Relay types
pub use relay::{RelayConfig, RelayRouter, RelayServer};

// Host types
pub use host::{
    ActivatedBridge, ActivationOptions, HostConfig, HostRuntime, HostStatus, StatusLabels,
    TransportPreference, activate,
};

// Standalone types
pub use standalone::{AgentHttpService, ServiceConfig, ServiceInfo};
