//! Browser host side of the bridge.
//!
//! The host owns the agent service. It dials the relay, claims the active
//! host slot and answers relayed requests from its revision tracker.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Relay origin, transport choice, reconnect delay |
//! | `connector` | Socket dialing and frame pump (internal) |
//! | `runtime` | Connect loop and request dispatch |
//! | `status` | Connection status and labels |
//! | `activation` | Opt-in shell with status callback |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rune_bridge::host::{HostConfig, HostRuntime};
//! use rune_bridge::service::counter_service;
//!
//! # async fn run() -> rune_bridge::Result<()> {
//! let runtime = HostRuntime::start(Arc::new(counter_service()), HostConfig::new())?;
//! println!("host {}", runtime.host_id());
//! runtime.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Opt-in activation.
pub mod activation;

/// Host configuration.
pub mod config;

/// Socket connection and pump.
mod connector;

/// Host runtime.
pub mod runtime;

/// Host status.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use activation::{ActivatedBridge, ActivationOptions, StatusCallback, activate};
pub use config::{HostConfig, TransportPreference};
pub use runtime::HostRuntime;
pub use status::{BridgeState, HostStatus, StatusLabels};
