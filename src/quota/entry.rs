//! Quota Entry Types
//!
//! The per-route counter tracked by the quota store and the two flavours of
//! route it can belong to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a route's usage is reported in from elsewhere or counted here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Usage is owned by an external cache and pushed in as absolute counts
    Cacheable,
    /// Usage is incremented by this service on every admitted request
    NonCacheable,
}

impl RouteKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Cacheable => "cacheable",
            RouteKind::NonCacheable => "non_cacheable",
        }
    }
}

/// Quota state for a single route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaEntry {
    /// Upstream path this route maps to
    pub path: String,

    /// Maximum `used` within one window
    pub quota: u64,

    /// Usage in the current window, never above `quota`
    pub used: u64,
}

impl QuotaEntry {
    /// Create an entry with zero usage
    pub fn new(path: impl Into<String>, quota: u64) -> Self {
        Self {
            path: path.into(),
            quota,
            used: 0,
        }
    }

    /// Requests still admissible in this window
    pub fn remaining(&self) -> u64 {
        self.quota.saturating_sub(self.used)
    }

    /// True once `used` has reached `quota`
    pub fn is_exhausted(&self) -> bool {
        self.used >= self.quota
    }

    /// Take one unit of quota. Returns false and leaves the entry untouched
    /// when none is left.
    pub(crate) fn try_increment(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }

    /// Overwrite `used` with an absolute value, clamped to `quota`
    pub(crate) fn set_used(&mut self, used: u64) {
        self.used = used.min(self.quota);
    }

    /// Start a new window
    pub(crate) fn reset(&mut self) {
        self.used = 0;
    }
}

/// Route key to entry, ordered so snapshots serialize deterministically
pub type Registry = BTreeMap<String, QuotaEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = QuotaEntry::new("/baz", 10);
        assert_eq!(entry.path, "/baz");
        assert_eq!(entry.quota, 10);
        assert_eq!(entry.used, 0);
        assert_eq!(entry.remaining(), 10);
    }

    #[test]
    fn test_increment_until_exhausted() {
        let mut entry = QuotaEntry::new("/baz", 2);

        assert!(entry.try_increment());
        assert!(entry.try_increment());
        assert!(entry.is_exhausted());

        // Should fail - nothing left
        assert!(!entry.try_increment());
        assert_eq!(entry.used, 2);
    }

    #[test]
    fn test_zero_quota_never_admits() {
        let mut entry = QuotaEntry::new("/closed", 0);
        assert!(entry.is_exhausted());
        assert!(!entry.try_increment());
        assert_eq!(entry.used, 0);
    }

    #[test]
    fn test_set_used_clamps() {
        let mut entry = QuotaEntry::new("/foo", 10);
        entry.set_used(15);
        assert_eq!(entry.used, 10);

        entry.set_used(4);
        assert_eq!(entry.used, 4);
    }

    #[test]
    fn test_reset() {
        let mut entry = QuotaEntry::new("/foo", 10);
        entry.set_used(7);
        entry.reset();
        assert_eq!(entry.used, 0);
    }

    #[test]
    fn test_entry_serialization() {
        let entry = QuotaEntry::new("/foo", 10);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"path": "/foo", "quota": 10, "used": 0}));
    }
}
