// Prometheus metrics for the gatekeeper management service
//
// Exposed on the /metrics endpoint of the main router:
// - Auth decisions by outcome (counter)
// - Auth decision latency (histogram)
// - Tokens issued (counter)
// - Cache merges by outcome (counter)
// - Window resets (counter)
// - Per-route used / quota (gauge)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Arc, Once};

use crate::quota::QuotaEntry;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Auth metrics
    pub static ref AUTH_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("auth_decisions_total", "Auth gateway decisions by outcome"),
        &["outcome"]
    ).expect("Failed to create auth decisions metric");

    pub static ref AUTH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("auth_duration_seconds", "Time to reach an auth decision"),
    ).expect("Failed to create auth duration metric");

    pub static ref TOKENS_ISSUED_TOTAL: IntCounter = IntCounter::new(
        "tokens_issued_total",
        "Total number of tokens issued"
    ).expect("Failed to create tokens issued metric");

    // Quota metrics
    pub static ref CACHE_MERGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_merges_total", "Cache report entries merged, by outcome"),
        &["outcome"]
    ).expect("Failed to create cache merges metric");

    pub static ref WINDOW_RESETS_TOTAL: IntCounter = IntCounter::new(
        "window_resets_total",
        "Total number of quota window resets"
    ).expect("Failed to create window resets metric");

    pub static ref ROUTE_QUOTA_USED: IntGaugeVec = IntGaugeVec::new(
        Opts::new("route_quota_used", "Requests used in the current window"),
        &["route"]
    ).expect("Failed to create route used metric");

    pub static ref ROUTE_QUOTA_LIMIT: IntGaugeVec = IntGaugeVec::new(
        Opts::new("route_quota_limit", "Requests allowed per window"),
        &["route"]
    ).expect("Failed to create route limit metric");
}

static INIT: Once = Once::new();

/// Register all metrics with [`REGISTRY`]. Safe to call more than once; only
/// the first call registers.
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| result = register_all());
    result
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(AUTH_DECISIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUTH_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(TOKENS_ISSUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_MERGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WINDOW_RESETS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ROUTE_QUOTA_USED.clone()))?;
    REGISTRY.register(Box::new(ROUTE_QUOTA_LIMIT.clone()))?;
    Ok(())
}

/// Publish a route's counters
pub fn record_route_usage(route_key: &str, entry: &QuotaEntry) {
    ROUTE_QUOTA_USED
        .with_label_values(&[route_key])
        .set(i64::try_from(entry.used).unwrap_or(i64::MAX));
    ROUTE_QUOTA_LIMIT
        .with_label_values(&[route_key])
        .set(i64::try_from(entry.quota).unwrap_or(i64::MAX));
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_route_gauges() {
        let mut entry = QuotaEntry::new("/metrics-test", 10);
        entry.used = 3;
        record_route_usage("metrics-test", &entry);

        assert_eq!(
            ROUTE_QUOTA_USED.with_label_values(&["metrics-test"]).get(),
            3
        );
        assert_eq!(
            ROUTE_QUOTA_LIMIT.with_label_values(&["metrics-test"]).get(),
            10
        );
    }

    #[test]
    fn test_route_gauges_saturate_for_unbounded_quota() {
        let mut entry = QuotaEntry::new("/metrics-unbounded", u64::MAX);
        entry.used = u64::MAX - 1;
        record_route_usage("metrics-unbounded", &entry);

        assert_eq!(
            ROUTE_QUOTA_USED.with_label_values(&["metrics-unbounded"]).get(),
            i64::MAX
        );
        assert_eq!(
            ROUTE_QUOTA_LIMIT.with_label_values(&["metrics-unbounded"]).get(),
            i64::MAX
        );
    }

    #[test]
    fn test_gather_contains_registered_metrics() {
        init().unwrap();
        WINDOW_RESETS_TOTAL.inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("window_resets_total"));
    }
}
