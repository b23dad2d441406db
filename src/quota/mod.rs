//! Quota Tracking Module
//!
//! Per-route request quotas for the gateway. Two kinds of route share one
//! registry:
//!
//! - **Non-cacheable** routes are counted here: every admitted request
//!   increments `used` through [`QuotaStore::admit`].
//! - **Cacheable** routes are counted by an external cache owner that pushes
//!   its absolute usage through [`QuotaStore::merge_cache_update`].
//!
//! The [`WindowResetter`] zeroes both tables on fixed wall-clock boundaries.
//!
//! ```text
//! ┌──────────────┐  admit   ┌──────────────────────────────┐   reset_all   ┌────────────────┐
//! │ Auth Gateway │ ───────▶ │          QuotaStore          │ ◀──────────── │ WindowResetter │
//! └──────────────┘          │  ┌───────────┐ ┌───────────┐ │               └────────────────┘
//!                           │  │ cacheable │ │ non-cache │ │
//! ┌──────────────┐  merge   │  └───────────┘ └───────────┘ │
//! │ Cache owner  │ ───────▶ │         (one mutex)          │
//! └──────────────┘          └──────────────────────────────┘
//! ```

pub mod config;
pub mod entry;
pub mod resetter;
pub mod store;

pub use config::{RouteConfig, RoutesConfig, WindowConfig, MAX_WINDOW_SECS};
pub use entry::{QuotaEntry, Registry, RouteKind};
pub use resetter::{ResetterHandle, WindowResetter};
pub use store::{CacheUpdate, MergeOutcome, QuotaStore, ReportedUsage};
