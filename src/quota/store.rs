//! Quota Store
//!
//! Process-wide quota registry. A single async mutex guards both route
//! tables, so admission, cache merges and window resets each run their
//! read-check-write as one critical section.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::RoutesConfig;
use super::entry::{QuotaEntry, Registry, RouteKind};
use crate::error::QuotaError;
use crate::metrics;

/// Usage reported for one cacheable route.
///
/// Accepts either a bare count or an object with a `used` field, so a
/// snapshot returned by `GET /cache` can be posted back as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportedUsage {
    Count(u64),
    Entry { used: u64 },
}

impl ReportedUsage {
    pub fn used(&self) -> u64 {
        match *self {
            ReportedUsage::Count(used) | ReportedUsage::Entry { used } => used,
        }
    }
}

/// Absolute usage counts pushed by the cache owner, keyed by route
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheUpdate {
    pub reports: BTreeMap<String, ReportedUsage>,
}

impl CacheUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper used by callers and tests
    pub fn with(mut self, route_key: &str, used: u64) -> Self {
        self.reports
            .insert(route_key.to_string(), ReportedUsage::Count(used));
        self
    }
}

/// What a single cache report did to the stored counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Reported value equals the stored one
    Unchanged,
    /// Reported value reached the quota; stored value clamped
    LimitReached,
    /// Stored value replaced by the report
    Updated,
    /// Key is not a cacheable route
    Skipped,
}

impl MergeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeOutcome::Unchanged => "unchanged",
            MergeOutcome::LimitReached => "limit_reached",
            MergeOutcome::Updated => "updated",
            MergeOutcome::Skipped => "skipped",
        }
    }
}

/// The two disjoint route tables
#[derive(Debug, Clone, Default)]
pub struct QuotaRegistry {
    cacheable: Registry,
    non_cacheable: Registry,
}

impl QuotaRegistry {
    pub fn from_routes(routes: &RoutesConfig) -> Self {
        Self {
            cacheable: routes.cacheable_registry(),
            non_cacheable: routes.non_cacheable_registry(),
        }
    }

    fn lookup(&self, route_key: &str) -> Option<(RouteKind, &QuotaEntry)> {
        self.non_cacheable
            .get(route_key)
            .map(|e| (RouteKind::NonCacheable, e))
            .or_else(|| {
                self.cacheable
                    .get(route_key)
                    .map(|e| (RouteKind::Cacheable, e))
            })
    }

    /// Check-and-increment on a non-cacheable route
    pub fn admit(&mut self, route_key: &str) -> Result<QuotaEntry, QuotaError> {
        let entry = self
            .non_cacheable
            .get_mut(route_key)
            .ok_or_else(|| QuotaError::NotFound(route_key.to_string()))?;

        if !entry.try_increment() {
            return Err(QuotaError::Exceeded {
                route: route_key.to_string(),
                quota: entry.quota,
            });
        }

        Ok(entry.clone())
    }

    /// Apply one absolute report to a cacheable route
    pub fn merge_report(&mut self, route_key: &str, reported: u64) -> MergeOutcome {
        let Some(entry) = self.cacheable.get_mut(route_key) else {
            return MergeOutcome::Skipped;
        };

        if reported == entry.used {
            MergeOutcome::Unchanged
        } else if reported >= entry.quota {
            entry.set_used(entry.quota);
            MergeOutcome::LimitReached
        } else {
            entry.set_used(reported);
            MergeOutcome::Updated
        }
    }

    pub fn reset_all(&mut self) {
        for entry in self
            .cacheable
            .values_mut()
            .chain(self.non_cacheable.values_mut())
        {
            entry.reset();
        }
    }

    pub fn cacheable(&self) -> &Registry {
        &self.cacheable
    }

    pub fn non_cacheable(&self) -> &Registry {
        &self.non_cacheable
    }
}

/// Shared handle to the quota registry
#[derive(Debug, Clone)]
pub struct QuotaStore {
    registry: Arc<Mutex<QuotaRegistry>>,
}

impl QuotaStore {
    /// Create a store with the configured quotas and zero usage
    pub fn new(routes: &RoutesConfig) -> Self {
        let registry = QuotaRegistry::from_routes(routes);
        for (key, entry) in registry.cacheable.iter().chain(registry.non_cacheable.iter()) {
            metrics::record_route_usage(key, entry);
        }

        Self {
            registry: Arc::new(Mutex::new(registry)),
        }
    }

    /// Current state of a route in either table
    pub async fn get(&self, route_key: &str) -> Result<QuotaEntry, QuotaError> {
        let registry = self.registry.lock().await;
        registry
            .lookup(route_key)
            .map(|(_, entry)| entry.clone())
            .ok_or_else(|| QuotaError::NotFound(route_key.to_string()))
    }

    /// Current state of a route together with the table it lives in
    pub async fn route_status(&self, route_key: &str) -> Result<(RouteKind, QuotaEntry), QuotaError> {
        let registry = self.registry.lock().await;
        registry
            .lookup(route_key)
            .map(|(kind, entry)| (kind, entry.clone()))
            .ok_or_else(|| QuotaError::NotFound(route_key.to_string()))
    }

    /// Resolve an upstream path to its non-cacheable route key
    pub async fn non_cacheable_route_for_path(&self, path: &str) -> Result<String, QuotaError> {
        let registry = self.registry.lock().await;
        registry
            .non_cacheable
            .iter()
            .find(|(_, entry)| entry.path == path)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| QuotaError::NotFound(path.to_string()))
    }

    /// Atomically admit one request against a non-cacheable route
    pub async fn admit(&self, route_key: &str) -> Result<QuotaEntry, QuotaError> {
        let mut registry = self.registry.lock().await;
        let result = registry.admit(route_key);

        match &result {
            Ok(entry) => {
                metrics::record_route_usage(route_key, entry);
                debug!(route = route_key, used = entry.used, quota = entry.quota, "admitted");
            }
            Err(QuotaError::Exceeded { quota, .. }) => {
                debug!(route = route_key, quota = *quota, "quota exhausted");
            }
            Err(QuotaError::NotFound(_)) => {}
        }

        result
    }

    /// Reconcile cacheable counters with a report and return the result.
    ///
    /// Each report is the new absolute usage, not a delta.
    pub async fn merge_cache_update(&self, update: &CacheUpdate) -> Registry {
        let mut registry = self.registry.lock().await;

        for (route_key, reported) in &update.reports {
            let reported = reported.used();
            let outcome = registry.merge_report(route_key, reported);
            metrics::CACHE_MERGES_TOTAL
                .with_label_values(&[outcome.as_str()])
                .inc();

            match outcome {
                MergeOutcome::Unchanged => {}
                MergeOutcome::LimitReached => {
                    info!(route = %route_key, reported, "global limit reached");
                }
                MergeOutcome::Updated => {
                    info!(route = %route_key, reported, "global limit updated");
                }
                MergeOutcome::Skipped => {
                    warn!(route = %route_key, reported, "cache update names a route that is not cacheable, ignoring");
                    continue;
                }
            }

            if let Some(entry) = registry.cacheable.get(route_key) {
                metrics::record_route_usage(route_key, entry);
            }
        }

        registry.cacheable.clone()
    }

    /// Current cacheable table
    pub async fn snapshot_cacheable(&self) -> Registry {
        self.registry.lock().await.cacheable.clone()
    }

    /// Zero every counter in both tables
    pub async fn reset_all(&self) {
        let mut registry = self.registry.lock().await;
        registry.reset_all();

        for (key, entry) in registry.cacheable.iter().chain(registry.non_cacheable.iter()) {
            metrics::record_route_usage(key, entry);
        }
    }
}
