//! Standalone deployment: the agent service served directly over HTTP.
//!
//! No relay and no browser are involved. The same revision tracker and
//! dispatch used by the host runtime back a small axum app, and `wait` is a
//! plain long-poll on the HTTP request.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Bind address, paths and wait ceiling |
//! | `server` | Routes and lifecycle |
//! | `ui` | Optional HTML console |

// ============================================================================
// Submodules
// ============================================================================

/// Standalone configuration.
pub mod config;

/// HTTP service.
pub mod server;

/// HTML console.
pub mod ui;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::ServiceConfig;
pub use server::{AgentHttpService, ServiceInfo};
