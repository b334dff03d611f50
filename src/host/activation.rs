//! Opt-in activation of a host runtime.
//!
//! A thin shell around [`HostRuntime`]: it decides whether the bridge runs
//! at all and forwards status transitions to a callback.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::Result;
use crate::identifiers::HostId;
use crate::service::AgentService;

use super::config::HostConfig;
use super::runtime::HostRuntime;
use super::status::HostStatus;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked on every status transition.
pub type StatusCallback = Arc<dyn Fn(&HostStatus) + Send + Sync>;

/// Options for [`activate`].
#[derive(Clone, Default)]
pub struct ActivationOptions {
    /// Whether to start the bridge. `None` means "in debug builds only".
    pub enabled: Option<bool>,

    /// Host runtime configuration.
    pub config: HostConfig,

    /// Status observer.
    pub on_status_change: Option<StatusCallback>,
}

impl ActivationOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the bridge on or off.
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Sets the host configuration.
    #[must_use]
    pub fn with_config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the status callback.
    #[must_use]
    pub fn with_status_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&HostStatus) + Send + Sync + 'static,
    {
        self.on_status_change = Some(Arc::new(callback));
        self
    }

    fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(cfg!(debug_assertions))
    }
}

impl fmt::Debug for ActivationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationOptions")
            .field("enabled", &self.enabled)
            .field("config", &self.config)
            .field("on_status_change", &self.on_status_change.is_some())
            .finish()
    }
}

// ============================================================================
// ActivatedBridge
// ============================================================================

/// Handle returned by [`activate`].
pub struct ActivatedBridge {
    runtime: Option<HostRuntime>,
    inert_status: HostStatus,
    watcher: Option<JoinHandle<()>>,
}

impl ActivatedBridge {
    /// Whether a runtime was started.
    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.runtime.is_some()
    }

    /// Current status; always disconnected when inert.
    #[must_use]
    pub fn status(&self) -> HostStatus {
        match &self.runtime {
            Some(runtime) => runtime.status(),
            None => self.inert_status.clone(),
        }
    }

    /// Underlying runtime, if enabled.
    #[must_use]
    pub fn runtime(&self) -> Option<&HostRuntime> {
        self.runtime.as_ref()
    }

    /// Stops the runtime. Does nothing when inert.
    pub async fn stop(&self) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        runtime.stop().await;
        if let Some(watcher) = &self.watcher {
            watcher.abort();
        }
    }
}

impl Drop for ActivatedBridge {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

// ============================================================================
// activate
// ============================================================================

/// Starts a host runtime for `service` if the options enable it.
///
/// # Errors
///
/// Returns [`crate::Error::Config`] for an invalid host configuration.
pub fn activate(service: Arc<dyn AgentService>, options: ActivationOptions) -> Result<ActivatedBridge> {
    if !options.is_enabled() {
        debug!("Bridge activation disabled");
        return Ok(ActivatedBridge {
            runtime: None,
            inert_status: HostStatus::disconnected(HostId::generate().as_str()),
            watcher: None,
        });
    }

    let runtime = HostRuntime::start(service, options.config)?;
    let inert_status = HostStatus::disconnected(runtime.host_id());

    let watcher = options.on_status_change.map(|callback| {
        let mut rx = runtime.subscribe_status();
        tokio::spawn(async move {
            let current = rx.borrow_and_update().clone();
            callback(&current);
            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                callback(&current);
            }
        })
    });

    Ok(ActivatedBridge {
        runtime: Some(runtime),
        inert_status,
        watcher,
    })
}

// ============================================================================
// Tests
// ============================================================================
