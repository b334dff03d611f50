//! Snapshot types.
//!
//! A [`Snapshot`] is the controller-visible view of an agent service at one
//! revision. Snapshots are never patched; a change produces a new one.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::service::ServiceView;

// ============================================================================
// Constants
// ============================================================================

/// Reserved action name for the long-poll primitive.
pub const WAIT_ACTION: &str = "wait";

/// Usage note included in relay snapshots for agents building requests.
pub const ACTION_REQUEST_CONVENTION: &str = "POST to the action href with Content-Type: application/json. \
Request body must be a single JSON value that validates against the action's input schema \
(object { since?, timeoutMs? } for wait). Do not wrap the value in { input: ... }.";

// ============================================================================
// Types
// ============================================================================

/// One observed state: its schema and current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// JSON schema describing the value.
    pub schema: Value,
    /// Current value.
    pub value: Value,
}

/// How to invoke one action over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Input schema, or `false` when the action takes no input.
    pub input: Value,

    /// Always `POST`.
    pub method: String,

    /// Path to post the input to.
    pub href: String,

    /// Set on bridge-internal actions such as `wait`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<bool>,
}

/// Immutable, revisioned view of an agent service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Strictly increasing version number.
    pub revision: u64,

    /// Current states by name.
    pub states: BTreeMap<String, StateEntry>,

    /// Currently available actions by name, including `wait`.
    pub actions: BTreeMap<String, ActionDescriptor>,

    /// Service-level description, when the service provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Request-body convention for agents.
    #[serde(
        rename = "_actionRequestBody",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub action_request_body: Option<String>,
}

// ============================================================================
// SnapshotLayout
// ============================================================================

/// Fixed parameters for building snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLayout {
    /// Prefix for action hrefs, ending in `/`.
    pub actions_base_path: String,
    /// Upper bound advertised in the `wait` schema.
    pub max_wait: Duration,
    /// Whether to include [`ACTION_REQUEST_CONVENTION`].
    pub include_convention: bool,
}

impl SnapshotLayout {
    /// Creates a layout.
    #[inline]
    pub fn new(actions_base_path: impl Into<String>, max_wait: Duration) -> Self {
        Self {
            actions_base_path: actions_base_path.into(),
            max_wait,
            include_convention: false,
        }
    }

    /// Includes the request-body convention note.
    #[inline]
    #[must_use]
    pub fn with_convention(mut self) -> Self {
        self.include_convention = true;
        self
    }

    /// Returns the href for an action name.
    #[must_use]
    pub fn href(&self, action: &str) -> String {
        format!("{}{}", self.actions_base_path, urlencoding::encode(action))
    }

    /// Builds a snapshot at `revision` from a service view.
    #[must_use]
    pub fn build(&self, revision: u64, view: &ServiceView, description: Option<String>) -> Snapshot {
        let mut actions: BTreeMap<String, ActionDescriptor> = view
            .actions
            .iter()
            .filter(|(name, _)| name.as_str() != WAIT_ACTION)
            .map(|(name, spec)| {
                let descriptor = ActionDescriptor {
                    input: spec.input.clone().unwrap_or(Value::Bool(false)),
                    method: "POST".to_string(),
                    href: self.href(name),
                    meta: None,
                };
                (name.clone(), descriptor)
            })
            .collect();

        actions.insert(
            WAIT_ACTION.to_string(),
            ActionDescriptor {
                input: wait_schema(self.max_wait),
                method: "POST".to_string(),
                href: self.href(WAIT_ACTION),
                meta: Some(true),
            },
        );

        Snapshot {
            revision,
            states: view.states.clone(),
            actions,
            description,
            action_request_body: self
                .include_convention
                .then(|| ACTION_REQUEST_CONVENTION.to_string()),
        }
    }
}

/// Input schema of the reserved `wait` action.
#[must_use]
pub fn wait_schema(max_wait: Duration) -> Value {
    json!({
        "type": "object",
        "properties": {
            "since": { "type": "integer", "minimum": 0 },
            "timeoutMs": { "type": "integer", "minimum": 0, "maximum": max_wait.as_millis() as u64 }
        },
        "additionalProperties": false
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::service::ActionSpec;

    fn view() -> ServiceView {
        let mut view = ServiceView::default();
        view.states.insert(
            "count".into(),
            StateEntry {
                schema: json!({ "type": "integer" }),
                value: json!(3),
            },
        );
        view.actions.insert("reset".into(), ActionSpec::without_input());
        view.actions.insert(
            "add amount".into(),
            ActionSpec::with_input(json!({ "type": "integer" })),
        );
        view
    }

    #[test]
    fn test_build_adds_wait_meta_action() {
        let layout = SnapshotLayout::new("/__rune_bridge/actions/", Duration::from_secs(30));
        let snapshot = layout.build(4, &view(), None);

        assert_eq!(snapshot.revision, 4);
        let wait = &snapshot.actions[WAIT_ACTION];
        assert_eq!(wait.meta, Some(true));
        assert_eq!(wait.href, "/__rune_bridge/actions/wait");
        assert_eq!(wait.input["properties"]["timeoutMs"]["maximum"], json!(30_000));
    }

    #[test]
    fn test_build_encodes_href_and_false_input() {
        let layout = SnapshotLayout::new("/actions/", Duration::from_secs(5));
        let snapshot = layout.build(0, &view(), None);

        assert_eq!(snapshot.actions["reset"].input, json!(false));
        assert_eq!(snapshot.actions["add amount"].href, "/actions/add%20amount");
        assert_eq!(snapshot.actions["add amount"].meta, None);
    }

    #[test]
    fn test_convention_and_description_serialization() {
        let layout = SnapshotLayout::new("/a/", Duration::from_secs(1)).with_convention();
        let snapshot = layout.build(1, &view(), Some("counter".into()));
        let value = serde_json::to_value(&snapshot).expect("serialize");

        assert_eq!(value["description"], json!("counter"));
        assert!(value["_actionRequestBody"].as_str().is_some());

        let plain = SnapshotLayout::new("/a/", Duration::from_secs(1)).build(1, &view(), None);
        let value = serde_json::to_value(&plain).expect("serialize");
        assert!(value.get("_actionRequestBody").is_none());
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_service_cannot_shadow_wait() {
        let mut view = view();
        view.actions.insert(WAIT_ACTION.into(), ActionSpec::without_input());
        let snapshot = SnapshotLayout::new("/a/", Duration::from_secs(1)).build(0, &view, None);
        assert_eq!(snapshot.actions[WAIT_ACTION].meta, Some(true));
    }
}
