//! Action and wait dispatch.
//!
//! Both the host runtime and the standalone HTTP service run actions the
//! same way: resolve the name against the current snapshot, validate the
//! input against the declared schema, execute, and translate the outcome.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{ActionResponse, Snapshot, WAIT_ACTION, WaitRequest};

use super::{ActionOutcome, AgentService, RevisionTracker};

// ============================================================================
// Actions
// ============================================================================

/// Runs a named action and returns the snapshot current afterwards.
///
/// # Errors
///
/// - [`Error::InvalidActionName`] for a blank name
/// - [`Error::ActionUnavailable`] when the action is not in the snapshot
/// - [`Error::InvalidActionInput`] when the input fails its schema
/// - [`Error::ActionRejected`] when the handler declines
/// - any service fault, surfaced as `internal_error`
pub async fn invoke_action(
    service: &dyn AgentService,
    tracker: &RevisionTracker,
    name: &str,
    input: Option<Value>,
) -> Result<Arc<Snapshot>> {
    if name.trim().is_empty() {
        return Err(Error::InvalidActionName);
    }

    let snapshot = tracker.ready().await?;
    let descriptor = snapshot
        .actions
        .get(name)
        .filter(|descriptor| descriptor.meta != Some(true) && name != WAIT_ACTION)
        .ok_or_else(|| Error::action_unavailable(name))?;

    if !descriptor.input.is_boolean() {
        validate_input(&descriptor.input, input.as_ref())?;
    }

    match service.execute(name, input).await {
        Ok(ActionOutcome::Completed) => {
            debug!(action = name, "Action completed");
            Ok(tracker.snapshot().unwrap_or(snapshot))
        }
        Ok(ActionOutcome::Rejected(reason)) => {
            debug!(action = name, %reason, "Action rejected");
            Err(Error::action_rejected(reason))
        }
        Err(e @ Error::ActionUnavailable { .. }) => Err(e),
        Err(e) => {
            warn!(action = name, error = %e, "Action failed");
            Err(Error::internal(e.to_string()))
        }
    }
}

/// Validates `input` against a JSON schema. Missing input validates as `null`.
///
/// # Errors
///
/// Returns [`Error::InvalidActionInput`] with one message per violation, or
/// [`Error::Internal`] when the schema itself does not compile.
pub fn validate_input(schema: &Value, input: Option<&Value>) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| Error::internal(format!("Invalid action schema: {e}")))?;

    let instance = input.cloned().unwrap_or(Value::Null);
    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidActionInput { errors })
    }
}

// ============================================================================
// Wait
// ============================================================================

/// Runs the long-poll primitive on raw wait input.
///
/// # Errors
///
/// Returns [`Error::InvalidWaitInput`] for malformed input.
pub async fn wait_for_change(
    tracker: &RevisionTracker,
    input: Option<&Value>,
    max_wait: Duration,
) -> Result<ActionResponse> {
    let request = WaitRequest::parse(input, max_wait)?;
    let (timed_out, snapshot) = tracker.wait_for_change(request).await?;
    Ok(ActionResponse::waited(timed_out, snapshot))
}

// ============================================================================
// Responses
// ============================================================================

/// Converts a dispatch result into a response body.
///
/// Failures carry the current snapshot when one exists.
#[must_use]
pub fn respond(result: Result<Arc<Snapshot>>, tracker: &RevisionTracker) -> ActionResponse {
    match result {
        Ok(snapshot) => ActionResponse::success(snapshot),
        Err(e) => ActionResponse::failure(e.to_bridge_error(), tracker.snapshot()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::error::ErrorCode;
    use crate::protocol::SnapshotLayout;
    use crate::service::{InMemoryService, Subscription, counter_service};

    fn wire(service: &InMemoryService) -> (Arc<RevisionTracker>, Subscription) {
        let tracker = RevisionTracker::new(
            SnapshotLayout::new("/actions/", Duration::from_secs(30)),
            service.description(),
        );
        let subscription = service.observe(tracker.observer());
        (tracker, subscription)
    }

    #[tokio::test]
    async fn test_invoke_advances_revision() {
        let service = counter_service();
        let (tracker, _subscription) = wire(&service);

        let snapshot = invoke_action(&service, &tracker, "increment", None).await.expect("invoke");
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.states["count"].value, json!(1));
    }

    #[tokio::test]
    async fn test_schema_violation_lists_errors() {
        let service = counter_service();
        let (tracker, _subscription) = wire(&service);

        let err = invoke_action(&service, &tracker, "add", Some(json!(99)))
            .await
            .expect_err("invalid");
        match err {
            Error::InvalidActionInput { errors } => assert!(!errors.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tracker.revision(), 0);
    }

    #[tokio::test]
    async fn test_rejection_keeps_snapshot() {
        let service = counter_service();
        let (tracker, _subscription) = wire(&service);

        let result = invoke_action(&service, &tracker, "reset", None).await;
        let response = respond(result, &tracker);
        assert!(!response.ok);
        let error = response.error.expect("error");
        assert_eq!(error.code, ErrorCode::ActionRejected);
        assert_eq!(error.message, "already_zero");
        assert_eq!(response.snapshot.expect("snapshot").revision, 0);
    }

    #[tokio::test]
    async fn test_unknown_blank_and_wait_names() {
        let service = counter_service();
        let (tracker, _subscription) = wire(&service);

        let err = invoke_action(&service, &tracker, "fly", None).await.expect_err("unknown");
        assert_eq!(err.code(), ErrorCode::ActionUnavailable);

        let err = invoke_action(&service, &tracker, " ", None).await.expect_err("blank");
        assert_eq!(err.code(), ErrorCode::InvalidActionName);

        let err = invoke_action(&service, &tracker, WAIT_ACTION, None).await.expect_err("wait");
        assert_eq!(err.code(), ErrorCode::ActionUnavailable);
    }

    #[tokio::test]
    async fn test_service_fault_is_internal() {
        let service = InMemoryService::builder()
            .action("explode", None, |_, _| Err(Error::config("bad wiring")))
            .build();
        let (tracker, _subscription) = wire(&service);

        let err = invoke_action(&service, &tracker, "explode", None).await.expect_err("fault");
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[tokio::test]
    async fn test_wait_rejects_bad_input() {
        let service = counter_service();
        let (tracker, _subscription) = wire(&service);

        let err = wait_for_change(&tracker, Some(&json!("soon")), Duration::from_secs(1))
            .await
            .expect_err("invalid");
        assert_eq!(err.code(), ErrorCode::InvalidWaitInput);
    }

    #[tokio::test]
    async fn test_wait_with_stale_since() {
        let service = counter_service();
        let (tracker, _subscription) = wire(&service);
        service.set_state("count", json!(4));

        let response = wait_for_change(&tracker, Some(&json!({ "since": 0 })), Duration::from_secs(1))
            .await
            .expect("wait");
        assert_eq!(response.timed_out, Some(false));
        assert_eq!(response.snapshot.expect("snapshot").revision, 1);
    }

    #[test]
    fn test_validate_input_null_for_missing() {
        assert!(validate_input(&json!({ "type": "null" }), None).is_ok());
        assert!(validate_input(&json!({ "type": "integer" }), None).is_err());
    }
}
