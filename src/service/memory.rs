//! In-process agent service.
//!
//! [`InMemoryService`] keeps named states in memory and exposes actions as
//! closures. Each action has an availability predicate evaluated against the
//! current states, so the action set changes as the state changes.
//!
//! # Example
//!
//! ```ignore
//! use rune_bridge::service::{ActionOutcome, InMemoryService};
//! use serde_json::json;
//!
//! let service = InMemoryService::builder()
//!     .state("count", json!({ "type": "integer" }), json!(0))
//!     .action("increment", None, |states, _input| {
//!         let next = states.get_i64("count").unwrap_or(0) + 1;
//!         states.set("count", json!(next));
//!         Ok(ActionOutcome::Completed)
//!     })
//!     .build();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::StateEntry;

use super::{ActionOutcome, ActionSpec, AgentService, Observer, ServiceView, Subscription};

// ============================================================================
// Types
// ============================================================================

/// Action body: mutates states and reports the outcome.
pub type ActionHandler =
    Arc<dyn Fn(&mut States, Option<Value>) -> Result<ActionOutcome> + Send + Sync>;

/// Availability predicate over the current states.
pub type Availability = Arc<dyn Fn(&States) -> bool + Send + Sync>;

/// Mutable state store handed to action handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct States {
    entries: BTreeMap<String, StateEntry>,
}

impl States {
    /// Returns a state value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|entry| &entry.value)
    }

    /// Returns a state value as an integer.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Replaces a state value, keeping its schema.
    ///
    /// Unknown names are added with an empty schema.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.entries.get_mut(name) {
            Some(entry) => entry.value = value,
            None => {
                self.entries.insert(
                    name.to_string(),
                    StateEntry {
                        schema: json!({}),
                        value,
                    },
                );
            }
        }
    }
}

#[derive(Clone)]
struct ActionEntry {
    spec: ActionSpec,
    available: Option<Availability>,
    handler: ActionHandler,
}

// ============================================================================
// InMemoryService
// ============================================================================

/// Closure-backed [`AgentService`].
pub struct InMemoryService {
    description: Option<String>,
    states: Mutex<States>,
    actions: BTreeMap<String, ActionEntry>,
    observers: Arc<Mutex<FxHashMap<u64, Observer>>>,
    next_observer: AtomicU64,
    emit_lock: Mutex<()>,
}

impl fmt::Debug for InMemoryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryService")
            .field("description", &self.description)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}

impl InMemoryService {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> InMemoryServiceBuilder {
        InMemoryServiceBuilder::default()
    }

    /// Returns the current view.
    #[must_use]
    pub fn view(&self) -> ServiceView {
        let states = self.states.lock();
        self.view_of(&states)
    }

    /// Replaces a state value from outside an action and notifies observers.
    pub fn set_state(&self, name: &str, value: Value) {
        self.states.lock().set(name, value);
        self.emit();
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    fn view_of(&self, states: &States) -> ServiceView {
        let actions = self
            .actions
            .iter()
            .filter(|(_, entry)| entry.available.as_ref().is_none_or(|f| f(states)))
            .map(|(name, entry)| (name.clone(), entry.spec.clone()))
            .collect();
        ServiceView {
            states: states.entries.clone(),
            actions,
        }
    }

    fn emit(&self) {
        // Serialize emissions so observers see views in mutation order.
        let _guard = self.emit_lock.lock();
        let view = self.view();
        let observers: Vec<Observer> = self.observers.lock().values().cloned().collect();
        trace!(observers = observers.len(), "Emitting service view");
        for observer in observers {
            observer(&view);
        }
    }
}

// ============================================================================
// AgentService Implementation
// ============================================================================

#[async_trait]
impl AgentService for InMemoryService {
    fn observe(&self, observer: Observer) -> Subscription {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        {
            let _guard = self.emit_lock.lock();
            observer(&self.view());
            self.observers.lock().insert(id, observer);
        }

        let observers = Arc::downgrade(&self.observers);
        Subscription::new(move || {
            if let Some(observers) = observers.upgrade() {
                observers.lock().remove(&id);
            }
        })
    }

    async fn execute(&self, action: &str, input: Option<Value>) -> Result<ActionOutcome> {
        let (outcome, changed) = {
            let mut states = self.states.lock();
            let entry = self
                .actions
                .get(action)
                .filter(|entry| entry.available.as_ref().is_none_or(|f| f(&*states)))
                .ok_or_else(|| Error::action_unavailable(action))?;
            let before = states.clone();
            let outcome = match (entry.handler)(&mut *states, input) {
                Ok(outcome) => outcome,
                Err(e) => {
                    // A failed handler leaves no partial writes behind.
                    *states = before;
                    return Err(e);
                }
            };
            (outcome, *states != before)
        };

        if changed {
            self.emit();
        }
        Ok(outcome)
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`InMemoryService`].
#[derive(Default)]
pub struct InMemoryServiceBuilder {
    description: Option<String>,
    states: States,
    actions: BTreeMap<String, ActionEntry>,
}

impl InMemoryServiceBuilder {
    /// Sets the service-level description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares a state with its schema and initial value.
    #[must_use]
    pub fn state(mut self, name: impl Into<String>, schema: Value, value: Value) -> Self {
        self.states
            .entries
            .insert(name.into(), StateEntry { schema, value });
        self
    }

    /// Declares an always-available action.
    ///
    /// `input` is the JSON schema of the action input, or `None`.
    #[must_use]
    pub fn action<F>(self, name: impl Into<String>, input: Option<Value>, handler: F) -> Self
    where
        F: Fn(&mut States, Option<Value>) -> Result<ActionOutcome> + Send + Sync + 'static,
    {
        self.insert(name.into(), input, None, Arc::new(handler))
    }

    /// Declares an action that is only available while `available` holds.
    #[must_use]
    pub fn action_when<P, F>(
        self,
        name: impl Into<String>,
        input: Option<Value>,
        available: P,
        handler: F,
    ) -> Self
    where
        P: Fn(&States) -> bool + Send + Sync + 'static,
        F: Fn(&mut States, Option<Value>) -> Result<ActionOutcome> + Send + Sync + 'static,
    {
        self.insert(name.into(), input, Some(Arc::new(available)), Arc::new(handler))
    }

    fn insert(
        mut self,
        name: String,
        input: Option<Value>,
        available: Option<Availability>,
        handler: ActionHandler,
    ) -> Self {
        let spec = ActionSpec { input };
        self.actions.insert(
            name,
            ActionEntry {
                spec,
                available,
                handler,
            },
        );
        self
    }

    /// Builds the service.
    #[must_use]
    pub fn build(self) -> InMemoryService {
        InMemoryService {
            description: self.description,
            states: Mutex::new(self.states),
            actions: self.actions,
            observers: Arc::new(Mutex::new(FxHashMap::default())),
            next_observer: AtomicU64::new(0),
            emit_lock: Mutex::new(()),
        }
    }
}

// ============================================================================
// Demo Service
// ============================================================================

/// Small counter service used by the binary and tests.
///
/// - `count`: integer state
/// - `increment`: adds one
/// - `add`: adds an integer in `1..=10`
/// - `decrement`: only available while `count > 0`
/// - `reset`: rejected with `already_zero` when `count == 0`
#[must_use]
pub fn counter_service() -> InMemoryService {
    InMemoryService::builder()
        .description("Counter with a few actions for exercising the bridge")
        .state("count", json!({ "type": "integer" }), json!(0))
        .action("increment", None, |states, _| {
            let next = states.get_i64("count").unwrap_or(0) + 1;
            states.set("count", json!(next));
            Ok(ActionOutcome::Completed)
        })
        .action(
            "add",
            Some(json!({ "type": "integer", "minimum": 1, "maximum": 10 })),
            |states, input| {
                let amount = input.as_ref().and_then(Value::as_i64).unwrap_or(0);
                let next = states.get_i64("count").unwrap_or(0) + amount;
                states.set("count", json!(next));
                Ok(ActionOutcome::Completed)
            },
        )
        .action_when(
            "decrement",
            None,
            |states| states.get_i64("count").unwrap_or(0) > 0,
            |states, _| {
                let next = states.get_i64("count").unwrap_or(0) - 1;
                states.set("count", json!(next));
                Ok(ActionOutcome::Completed)
            },
        )
        .action("reset", None, |states, _| {
            if states.get_i64("count").unwrap_or(0) == 0 {
                return Ok(ActionOutcome::Rejected("already_zero".into()));
            }
            states.set("count", json!(0));
            Ok(ActionOutcome::Completed)
        })
        .build()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    fn recording_observer() -> (Observer, Arc<Mutex<Vec<ServiceView>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Observer = Arc::new(move |view: &ServiceView| sink.lock().push(view.clone()));
        (observer, seen)
    }

    #[test]
    fn test_observe_emits_current_view_synchronously() {
        let service = counter_service();
        let (observer, seen) = recording_observer();
        let _subscription = service.observe(observer);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].states["count"].value, json!(0));
        assert!(seen[0].actions.contains_key("increment"));
        assert!(!seen[0].actions.contains_key("decrement"));
    }

    #[tokio::test]
    async fn test_execute_emits_and_updates_availability() {
        let service = counter_service();
        let (observer, seen) = recording_observer();
        let _subscription = service.observe(observer);

        let outcome = service.execute("increment", None).await.expect("execute");
        assert_eq!(outcome, ActionOutcome::Completed);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].states["count"].value, json!(1));
        assert!(seen[1].actions.contains_key("decrement"));
    }

    #[tokio::test]
    async fn test_rejection_does_not_emit() {
        let service = counter_service();
        let (observer, seen) = recording_observer();
        let _subscription = service.observe(observer);

        let outcome = service.execute("reset", None).await.expect("execute");
        assert_eq!(outcome, ActionOutcome::Rejected("already_zero".into()));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_action() {
        let service = counter_service();
        let err = service.execute("decrement", None).await.expect_err("unavailable");
        assert!(matches!(err, Error::ActionUnavailable { ref action } if action == "decrement"));

        let err = service.execute("missing", None).await.expect_err("unknown");
        assert!(matches!(err, Error::ActionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_handler_fault_propagates() {
        let service = InMemoryService::builder()
            .action("explode", None, |_, _| Err(Error::internal("boom")))
            .build();
        let err = service.execute("explode", None).await.expect_err("fault");
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[tokio::test]
    async fn test_failed_handler_rolls_back_writes() {
        let service = InMemoryService::builder()
            .state("count", json!({ "type": "integer" }), json!(0))
            .action("half_done", None, |states, _| {
                states.set("count", json!(7));
                Err(Error::internal("gave up midway"))
            })
            .build();
        let (observer, seen) = recording_observer();
        let _subscription = service.observe(observer);

        let err = service.execute("half_done", None).await.expect_err("fault");
        assert!(matches!(err, Error::Internal { .. }));
        assert_eq!(service.view().states["count"].value, json!(0));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let service = counter_service();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut subscription = service.observe(Arc::new(move |_: &ServiceView| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(service.observer_count(), 1);

        subscription.unsubscribe();
        service.set_state("count", json!(9));

        assert_eq!(service.observer_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_state_adds_unknown_names() {
        let mut states = States::default();
        states.set("label", json!("hi"));
        assert_eq!(states.get("label"), Some(&json!("hi")));
        assert_eq!(states.get_i64("label"), None);
    }
}
