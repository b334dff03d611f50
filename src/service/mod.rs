//! Agent service seam.
//!
//! The bridge never knows what the hosted service does. It sees two
//! observable collections (states and actions) and one operation
//! (`execute`). This module defines that seam and the pieces shared by the
//! host runtime and the standalone HTTP service.
//!
//! # Observation Contract
//!
//! [`AgentService::observe`] must call the observer synchronously with the
//! current view before returning, then again after every change. The
//! returned [`Subscription`] detaches the observer exactly once, either on
//! [`Subscription::unsubscribe`] or on drop.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process service backed by closures |
//! | `tracker` | Revision counter, snapshots and wait listeners |
//! | `invoke` | Action and wait dispatch shared by both deployments |

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::StateEntry;

// ============================================================================
// Submodules
// ============================================================================

/// Action and wait dispatch.
pub mod invoke;

/// In-process closure-backed service.
pub mod memory;

/// Revision tracking and long-poll listeners.
pub mod tracker;

// ============================================================================
// Re-exports
// ============================================================================

pub use invoke::{invoke_action, respond, wait_for_change};
pub use memory::{InMemoryService, InMemoryServiceBuilder, States, counter_service};
pub use tracker::RevisionTracker;

// ============================================================================
// ServiceView
// ============================================================================

/// Input declaration of one available action.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionSpec {
    /// JSON schema of the input, or `None` for input-less actions.
    pub input: Option<Value>,
}

impl ActionSpec {
    /// Action that takes input matching `schema`.
    #[inline]
    #[must_use]
    pub fn with_input(schema: Value) -> Self {
        Self {
            input: Some(schema),
        }
    }

    /// Action that takes no input.
    #[inline]
    #[must_use]
    pub const fn without_input() -> Self {
        Self { input: None }
    }
}

/// One emission of the service's combined states and actions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceView {
    /// States by name.
    pub states: BTreeMap<String, StateEntry>,
    /// Currently enabled actions by name.
    pub actions: BTreeMap<String, ActionSpec>,
}

// ============================================================================
// ActionOutcome
// ============================================================================

/// Result of a successfully executed action call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran.
    Completed,
    /// The handler declined, with a user-facing reason.
    Rejected(String),
}

// ============================================================================
// Subscription
// ============================================================================

/// Callback invoked with every view emission.
pub type Observer = Arc<dyn Fn(&ServiceView) + Send + Sync>;

/// Handle that detaches an observer exactly once.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps a detach closure.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to detach.
    #[must_use]
    pub fn inert() -> Self {
        Self { cancel: None }
    }

    /// Detaches the observer; later calls do nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Returns `true` until [`Self::unsubscribe`] runs.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ============================================================================
// AgentService
// ============================================================================

/// The service a host exposes to controllers.
#[async_trait]
pub trait AgentService: Send + Sync + 'static {
    /// Registers an observer; see the module docs for the contract.
    fn observe(&self, observer: Observer) -> Subscription;

    /// Runs an action by name.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ActionUnavailable`] when no handler exists; any other
    /// error is reported to callers as `internal_error`.
    async fn execute(&self, action: &str, input: Option<Value>) -> Result<ActionOutcome>;

    /// Optional service-level description included in snapshots.
    fn description(&self) -> Option<String> {
        None
    }
}

// ============================================================================
// Tests
// ============================================================================
