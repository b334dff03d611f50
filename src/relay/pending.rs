//! In-flight relay requests.
//!
//! Each entry is resolved exactly once. The party that removes it from the
//! map (reply, timeout, disconnect or shutdown) owns the resolution.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::TransportId;

// ============================================================================
// Types
// ============================================================================

/// Reply channel for one relayed request.
pub type ReplyReceiver = oneshot::Receiver<Result<Value>>;

struct PendingRelay {
    host_id: String,
    transport_id: TransportId,
    reply: oneshot::Sender<Result<Value>>,
}

// ============================================================================
// PendingRelays
// ============================================================================

/// Request id → pending relay.
#[derive(Default)]
pub struct PendingRelays {
    entries: Mutex<FxHashMap<String, PendingRelay>>,
}

impl PendingRelays {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request and returns the channel its reply arrives on.
    pub fn insert(
        &self,
        request_id: impl Into<String>,
        host_id: impl Into<String>,
        transport_id: TransportId,
    ) -> ReplyReceiver {
        let (reply, rx) = oneshot::channel();
        self.entries.lock().insert(
            request_id.into(),
            PendingRelay {
                host_id: host_id.into(),
                transport_id,
                reply,
            },
        );
        rx
    }

    /// Whether a request is still pending.
    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.lock().contains_key(request_id)
    }

    /// Resolves a pending request with a host reply.
    ///
    /// A reply whose `hostId` extension names a different host leaves the
    /// entry in place. Returns `true` when an entry matched the request id,
    /// whether or not it was resolved.
    pub fn resolve(&self, request_id: &str, reply_host_id: Option<&str>, payload: Value) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(request_id) else {
            return false;
        };

        if reply_host_id.is_some_and(|id| id != entry.host_id) {
            debug!(request_id, ?reply_host_id, expected = %entry.host_id, "Dropping reply from other host");
            return true;
        }

        if let Some(entry) = entries.remove(request_id) {
            let _ = entry.reply.send(Ok(payload));
        }
        true
    }

    /// Drops a request without resolving it; used by the timer.
    pub fn remove(&self, request_id: &str) -> bool {
        self.entries.lock().remove(request_id).is_some()
    }

    /// Fails a single request.
    pub fn reject(&self, request_id: &str, error: Error) -> bool {
        match self.entries.lock().remove(request_id) {
            Some(entry) => {
                let _ = entry.reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fails every request sent over `transport_id`.
    pub fn reject_transport(&self, transport_id: TransportId) -> usize {
        self.reject_where(|entry| entry.transport_id == transport_id)
    }

    /// Fails every request not owned by `host_id` over `transport_id`.
    pub fn reject_superseded(&self, host_id: &str, transport_id: TransportId) -> usize {
        self.reject_where(|entry| entry.host_id != host_id || entry.transport_id != transport_id)
    }

    /// Fails every pending request.
    pub fn reject_all(&self) -> usize {
        self.reject_where(|_| true)
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn reject_where(&self, predicate: impl Fn(&PendingRelay) -> bool) -> usize {
        let rejected: Vec<PendingRelay> = {
            let mut entries = self.entries.lock();
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| predicate(entry))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        let count = rejected.len();
        for entry in rejected {
            let _ = entry.reply.send(Err(Error::HostDisconnected));
        }
        if count > 0 {
            debug!(count, "Rejected pending relay requests");
        }
        count
    }
}

// ============================================================================
// Tests
// ============================================================================
