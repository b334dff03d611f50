//! Standalone service configuration.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::relay::config::DEFAULT_MAX_WAIT;

// ============================================================================
// Constants
// ============================================================================

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default API base path.
pub const DEFAULT_BASE_PATH: &str = "/";

/// Default console path.
pub const DEFAULT_UI_PATH: &str = "/ui";

// ============================================================================
// ServiceConfig
// ============================================================================

/// Configuration for [`super::AgentHttpService`].
///
/// Paths are stored as given; [`Self::base_path`] and [`Self::ui_path`]
/// return the normalized forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Bind host.
    pub host: String,

    /// Bind port; `0` picks a free one.
    pub port: u16,

    /// API base path as configured.
    pub base_path: String,

    /// Ceiling for `wait` timeouts.
    pub max_wait: Duration,

    /// Serve the HTML console.
    pub enable_ui: bool,

    /// Console path as configured.
    pub ui_path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            base_path: DEFAULT_BASE_PATH.to_string(),
            max_wait: DEFAULT_MAX_WAIT,
            enable_ui: false,
            ui_path: DEFAULT_UI_PATH.to_string(),
        }
    }

    /// Sets the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the bind port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the API base path.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Sets the wait ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Enables the HTML console.
    #[inline]
    #[must_use]
    pub fn with_ui(mut self, enabled: bool) -> Self {
        self.enable_ui = enabled;
        self
    }

    /// Sets the console path.
    #[must_use]
    pub fn with_ui_path(mut self, path: impl Into<String>) -> Self {
        self.ui_path = path.into();
        self
    }

    /// Normalized base path: `/` or `/segment` without a trailing slash.
    #[must_use]
    pub fn base_path(&self) -> String {
        normalize_path(&self.base_path, DEFAULT_BASE_PATH)
    }

    /// Normalized console path; blank or `/` falls back to `/ui`.
    #[must_use]
    pub fn ui_path(&self) -> String {
        normalize_path(&self.ui_path, DEFAULT_UI_PATH)
    }

    /// Prefix under which actions are served, ending in `/`.
    #[must_use]
    pub fn actions_base_path(&self) -> String {
        let base = self.base_path();
        if base == "/" {
            "/actions/".to_string()
        } else {
            format!("{base}/actions/")
        }
    }

    /// `host:port` for binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a blank host or a console path that
    /// shadows the API root.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.enable_ui && self.ui_path() == self.base_path() {
            return Err(Error::config("ui_path must differ from base_path"));
        }
        Ok(())
    }
}

/// Adds a leading slash and drops a trailing one; blank or `/` gives `fallback`.
fn normalize_path(path: &str, fallback: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return fallback.to_string();
    }
    let with_leading = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    match with_leading.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => with_leading,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::new();
        assert_eq!(config.bind_address(), "127.0.0.1:3001");
        assert_eq!(config.base_path(), "/");
        assert_eq!(config.ui_path(), "/ui");
        assert_eq!(config.actions_base_path(), "/actions/");
        assert!(!config.enable_ui);
        assert_eq!(config.max_wait, Duration::from_secs(30));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(ServiceConfig::new().with_base_path("api/").base_path(), "/api");
        assert_eq!(ServiceConfig::new().with_base_path("  ").base_path(), "/");
        assert_eq!(
            ServiceConfig::new().with_base_path("/api").actions_base_path(),
            "/api/actions/"
        );
        assert_eq!(ServiceConfig::new().with_ui_path("/").ui_path(), "/ui");
        assert_eq!(ServiceConfig::new().with_ui_path("console/").ui_path(), "/console");
    }

    #[test]
    fn test_validate() {
        assert!(ServiceConfig::new().validate().is_ok());
        assert!(ServiceConfig::new().with_host(" ").validate().is_err());
        assert!(
            ServiceConfig::new()
                .with_base_path("/ui")
                .with_ui(true)
                .validate()
                .is_err()
        );
    }
}
