//! Window Resetter
//!
//! Background task that zeroes every quota counter on wall-clock boundaries.
//! Boundaries are multiples of the window length since the Unix epoch, so two
//! processes with the same window reset at the same instants regardless of
//! when they started. A tick that is missed while the process is stalled is
//! skipped, never replayed.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::store::QuotaStore;
use crate::metrics;

/// First window boundary strictly after `now`.
///
/// Periods too large to place on the calendar saturate to the latest
/// representable instant, which simply means no reset ever comes due.
pub fn next_boundary(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period_ms = i64::try_from(period.as_millis()).unwrap_or(i64::MAX).max(1);
    let now_ms = now.timestamp_millis();

    now_ms
        .div_euclid(period_ms)
        .checked_add(1)
        .and_then(|n| n.checked_mul(period_ms))
        .and_then(|next_ms| Utc.timestamp_millis_opt(next_ms).single())
        .or_else(|| {
            chrono::Duration::try_milliseconds(period_ms).and_then(|d| now.checked_add_signed(d))
        })
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Boundary the resetter should wait for next.
///
/// This is the first boundary after `now`, unless the wall clock lags the
/// timer the previous wait slept on. Then it is the first boundary after
/// the one already fired, so no boundary fires twice. Boundaries that
/// passed during a stall are not returned.
pub fn next_reset(
    now: DateTime<Utc>,
    last_fired: Option<DateTime<Utc>>,
    period: Duration,
) -> DateTime<Utc> {
    let boundary = next_boundary(now, period);
    match last_fired {
        Some(last) if boundary <= last => next_boundary(last, period),
        _ => boundary,
    }
}

/// Periodic reset task over a quota store
#[derive(Debug, Clone)]
pub struct WindowResetter {
    store: QuotaStore,
    period: Duration,
}

impl WindowResetter {
    pub fn new(store: QuotaStore, period: Duration) -> Self {
        Self { store, period }
    }

    /// Run until the task is aborted
    pub async fn run(self) {
        let mut last_fired: Option<DateTime<Utc>> = None;

        loop {
            let now = Utc::now();
            let boundary = next_reset(now, last_fired, self.period);

            let wait = (boundary - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next_reset = %boundary, wait_ms = wait.as_millis() as u64, "waiting for window boundary");
            tokio::time::sleep(wait).await;

            self.store.reset_all().await;
            metrics::WINDOW_RESETS_TOTAL.inc();
            info!(boundary = %boundary, "quota window reset");

            last_fired = Some(boundary);
        }
    }

    /// Start the reset loop on the tokio runtime
    pub fn spawn(self) -> ResetterHandle {
        let period = self.period;
        info!(period_secs = period.as_secs_f64(), "starting window resetter");
        ResetterHandle {
            task: tokio::spawn(self.run()),
        }
    }
}

/// Handle to a running resetter; stopping it aborts the task
#[derive(Debug)]
pub struct ResetterHandle {
    task: JoinHandle<()>,
}

impl ResetterHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the resetter and wait for the task to wind down
    pub async fn stop(self) {
        self.task.abort();
        match self.task.await {
            Err(e) if e.is_panic() => error!(error = %e, "window resetter panicked"),
            _ => debug!("window resetter stopped"),
        }
    }
}
