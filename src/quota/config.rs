//! Quota Configuration
//!
//! Route tables and window cadence for the quota store.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::entry::{QuotaEntry, Registry};

/// Default window length, in seconds (two minutes)
pub const DEFAULT_WINDOW_SECS: u64 = 120;

/// Longest accepted window: one day
pub const MAX_WINDOW_SECS: u64 = 86_400;

/// Default per-route quota
pub const DEFAULT_ROUTE_QUOTA: u64 = 10;

/// A single route registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Stable route key, e.g. `baz`
    pub key: String,

    /// Upstream path, e.g. `/baz`
    pub path: String,

    /// Maximum admitted requests per window
    #[serde(default = "default_route_quota")]
    pub quota: u64,
}

fn default_route_quota() -> u64 {
    DEFAULT_ROUTE_QUOTA
}

impl RouteConfig {
    pub fn new(key: &str, path: &str, quota: u64) -> Self {
        Self {
            key: key.to_string(),
            path: path.to_string(),
            quota,
        }
    }
}

/// Cacheable and non-cacheable route tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Routes whose usage is pushed in by the cache owner
    pub cacheable: Vec<RouteConfig>,

    /// Routes admitted and counted by this service
    pub non_cacheable: Vec<RouteConfig>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            cacheable: vec![
                RouteConfig::new("foo", "/foo", DEFAULT_ROUTE_QUOTA),
                RouteConfig::new("bar", "/bar", DEFAULT_ROUTE_QUOTA),
            ],
            non_cacheable: vec![RouteConfig::new("baz", "/baz", DEFAULT_ROUTE_QUOTA)],
        }
    }
}

impl RoutesConfig {
    /// Check that keys and paths are unique across both tables
    pub fn validate(&self) -> Result<(), String> {
        if self.cacheable.is_empty() && self.non_cacheable.is_empty() {
            return Err("at least one route must be configured".to_string());
        }

        let mut keys = HashSet::new();
        let mut paths = HashSet::new();
        for route in self.cacheable.iter().chain(self.non_cacheable.iter()) {
            if route.key.is_empty() {
                return Err("route key must not be empty".to_string());
            }
            if !route.path.starts_with('/') {
                return Err(format!(
                    "route '{}' has path '{}' which must start with '/'",
                    route.key, route.path
                ));
            }
            if !keys.insert(route.key.as_str()) {
                return Err(format!("route key '{}' is registered twice", route.key));
            }
            if !paths.insert(route.path.as_str()) {
                return Err(format!("path '{}' is registered twice", route.path));
            }
        }

        Ok(())
    }

    /// Whether `key` names a non-cacheable route
    pub fn is_non_cacheable(&self, key: &str) -> bool {
        self.non_cacheable.iter().any(|r| r.key == key)
    }

    /// Initial cacheable registry with zero usage
    pub fn cacheable_registry(&self) -> Registry {
        to_registry(&self.cacheable)
    }

    /// Initial non-cacheable registry with zero usage
    pub fn non_cacheable_registry(&self) -> Registry {
        to_registry(&self.non_cacheable)
    }
}

fn to_registry(routes: &[RouteConfig]) -> Registry {
    routes
        .iter()
        .map(|r| (r.key.clone(), QuotaEntry::new(r.path.clone(), r.quota)))
        .collect()
}

/// Window cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Seconds between resets; boundaries are multiples of this since the epoch
    pub reset_interval_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            reset_interval_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl WindowConfig {
    /// Get window duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }
}
