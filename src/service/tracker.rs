//! Revision tracking and long-poll listeners.
//!
//! [`RevisionTracker`] turns service emissions into immutable snapshots and
//! resolves pending waits when the revision moves.
//!
//! Each wait listener is resolved exactly once: by the emission that
//! advances the revision, by its own timeout, or by [`RevisionTracker::close`].
//! Whoever removes the listener from the map owns its resolution.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{Snapshot, SnapshotLayout, WaitRequest};

use super::{Observer, ServiceView};

// ============================================================================
// Types
// ============================================================================

/// A pending long-poll. The sender carries `timed_out`.
struct WaitListener {
    resolve: oneshot::Sender<bool>,
}

#[derive(Default)]
struct TrackerInner {
    revision: u64,
    view: Option<ServiceView>,
    snapshot: Option<Arc<Snapshot>>,
    listeners: FxHashMap<u64, WaitListener>,
    next_listener: u64,
    closed: bool,
}

// ============================================================================
// RevisionTracker
// ============================================================================

/// Revision counter, current snapshot and wait listeners for one service.
pub struct RevisionTracker {
    layout: SnapshotLayout,
    description: Option<String>,
    inner: Mutex<TrackerInner>,
    /// Flips to `true` on the first emission or on close.
    settled: watch::Sender<bool>,
}

impl RevisionTracker {
    /// Creates a tracker that builds snapshots with `layout`.
    #[must_use]
    pub fn new(layout: SnapshotLayout, description: Option<String>) -> Arc<Self> {
        let (settled, _) = watch::channel(false);
        Arc::new(Self {
            layout,
            description,
            inner: Mutex::new(TrackerInner::default()),
            settled,
        })
    }

    /// Returns an observer that feeds this tracker.
    #[must_use]
    pub fn observer(self: &Arc<Self>) -> Observer {
        let tracker = Arc::clone(self);
        Arc::new(move |view: &ServiceView| tracker.on_emission(view))
    }

    /// Records one emission.
    ///
    /// The first emission builds revision 0. Later emissions advance the
    /// revision by one only when the view changed. The new snapshot is in
    /// place before any listener is woken.
    pub fn on_emission(&self, view: &ServiceView) {
        let first = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }

            let first = inner.view.is_none();
            if !first {
                if inner.view.as_ref() == Some(view) {
                    return;
                }
                inner.revision += 1;
            }

            let revision = inner.revision;
            let snapshot = self.layout.build(revision, view, self.description.clone());
            inner.view = Some(view.clone());
            inner.snapshot = Some(Arc::new(snapshot));

            let woken = inner.listeners.len();
            for (_, listener) in inner.listeners.drain() {
                let _ = listener.resolve.send(false);
            }
            trace!(revision, woken, "Revision recorded");
            first
        };

        if first {
            self.settled.send_replace(true);
        }
    }

    /// Current revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Current snapshot, if any emission has been observed.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.lock().snapshot.clone()
    }

    /// Number of pending wait listeners.
    #[must_use]
    pub fn pending_waits(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Whether [`Self::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Resolves once the first emission has been observed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when the tracker closed before any emission.
    pub async fn ready(&self) -> Result<Arc<Snapshot>> {
        let mut settled = self.settled.subscribe();
        loop {
            if let Some(snapshot) = self.snapshot() {
                return Ok(snapshot);
            }
            if self.is_closed() {
                return Err(Error::internal("Agent service closed before first emission"));
            }
            if settled.changed().await.is_err() {
                return Err(Error::internal("Agent service closed before first emission"));
            }
        }
    }

    /// Long-polls for a revision other than `request.since`.
    ///
    /// Returns `(timed_out, snapshot)`. The snapshot is the one current when
    /// the call returns. A `since` different from the current revision
    /// returns immediately with `timed_out == false`.
    ///
    /// # Errors
    ///
    /// Fails only when the tracker never became ready.
    pub async fn wait_for_change(&self, request: WaitRequest) -> Result<(bool, Arc<Snapshot>)> {
        let current = self.ready().await?;

        let (id, mut rx) = {
            let mut inner = self.inner.lock();
            let since = request.since.unwrap_or(inner.revision);
            if inner.closed {
                return Ok((true, inner.snapshot.clone().unwrap_or(current)));
            }
            if since != inner.revision {
                return Ok((false, inner.snapshot.clone().unwrap_or(current)));
            }

            let id = inner.next_listener;
            inner.next_listener += 1;
            let (tx, rx) = oneshot::channel();
            inner.listeners.insert(id, WaitListener { resolve: tx });
            (id, rx)
        };

        let timed_out = match timeout(request.timeout, &mut rx).await {
            Ok(Ok(timed_out)) => timed_out,
            Ok(Err(_)) => true,
            Err(_) => {
                let removed = self.inner.lock().listeners.remove(&id).is_some();
                if removed {
                    true
                } else {
                    // An emission or close won the race; take its verdict.
                    rx.try_recv().unwrap_or(true)
                }
            }
        };

        let snapshot = self.snapshot().unwrap_or(current);
        Ok((timed_out, snapshot))
    }

    /// Stops tracking and resolves every pending wait as timed out.
    pub fn close(&self) {
        let drained = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            let drained = inner.listeners.len();
            for (_, listener) in inner.listeners.drain() {
                let _ = listener.resolve.send(true);
            }
            drained
        };
        debug!(drained, "Revision tracker closed");
        self.settled.send_replace(true);
    }
}

// ============================================================================
// Tests
// ============================================================================
