//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers keep transport identities, host identities and relay
//! request ids from being mixed up.
//!
//! | Type | Source | Example |
//! |------|--------|---------|
//! | [`TransportId`] | process-wide counter | `transport-7` |
//! | [`HostId`] | random UUID v4 | `2f0c…` |
//! | [`RelayRequestIds`] | per-router counter | `relay-12` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// TransportId
// ============================================================================

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one live transport (one socket connection or one event
/// channel client).
///
/// Compared by value; the registry uses it to decide whether a disconnect
/// belongs to the active host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl TransportId {
    /// Allocates the next process-unique transport id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

// ============================================================================
// HostId
// ============================================================================

/// Identity a host runtime announces in `registerHost`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    /// Generates a random host id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing host id string.
    #[inline]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HostId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// RelayRequestIds
// ============================================================================

/// Monotonic generator for `<prefix>-N` request ids.
#[derive(Debug)]
pub struct RelayRequestIds {
    prefix: &'static str,
    next: AtomicU64,
}

impl RelayRequestIds {
    /// Creates a generator starting at 1.
    #[inline]
    #[must_use]
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next request id.
    #[must_use]
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_ids_are_unique() {
        let a = TransportId::next();
        let b = TransportId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("transport-"));
    }

    #[test]
    fn test_host_id_generate() {
        let a = HostId::generate();
        let b = HostId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_host_id_serializes_transparently() {
        let id = HostId::new("tab-1");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"tab-1\"");
    }

    #[test]
    fn test_relay_request_ids_sequence() {
        let ids = RelayRequestIds::new("relay");
        assert_eq!(ids.next_id(), "relay-1");
        assert_eq!(ids.next_id(), "relay-2");
    }
}
