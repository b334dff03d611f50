//! Controller-side relay.
//!
//! The relay sits between HTTP controllers and the single active host. It
//! accepts host connections on two socket routes, keeps a last-writer-wins
//! registry of the active host, and turns HTTP requests into correlated
//! envelopes.
//!
//! # Architecture
//!
//! ```text
//! HTTP client ──► http ──► RelayRouter ──► HostRegistry ──► Transport ──► host
//!                              ▲                                             │
//!                              └──────────── PendingRelays ◄── reply ────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Routes and timeouts |
//! | `registry` | Active host slot |
//! | `pending` | In-flight request table |
//! | `router` | Relay and inbound message handling |
//! | `http` | axum routes for controllers |
//! | `ws` | Socket upgrade routes for hosts |
//! | `server` | Bind, serve and shut down |

// ============================================================================
// Submodules
// ============================================================================

/// Relay configuration.
pub mod config;

/// Controller HTTP routes.
pub mod http;

/// In-flight relay requests.
pub mod pending;

/// Active host registry.
pub mod registry;

/// Relay router.
pub mod router;

/// Relay server lifecycle.
pub mod server;

/// Host socket routes.
pub mod ws;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::RelayConfig;
pub use pending::PendingRelays;
pub use registry::{HostRegistration, HostRegistry, HostStatusReport, RegisterOutcome};
pub use router::RelayRouter;
pub use server::RelayServer;
