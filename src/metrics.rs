// Prometheus metrics definitions for the karma backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Entries currently held by the duplicate-suppression cache.
    pub static ref DEDUP_CACHE_ENTRIES: IntGauge =
        IntGauge::new("karma_dedup_cache_entries", "Entries in the dedup cache").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Score events by kind and result (applied, duplicate, throttled, rejected).
    pub static ref SCORE_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("karma_score_events_total", "Score events processed"),
        &["kind", "result"],
    )
    .unwrap();

    /// Throttle decisions by action and outcome.
    pub static ref THROTTLE_CHECKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("karma_throttle_checks_total", "Throttle decisions"),
        &["action", "decision"],
    )
    .unwrap();

    /// Slot spins by result (win, lose, skipped).
    pub static ref SPINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("karma_spins_total", "Slot machine spins"),
        &["result"],
    )
    .unwrap();

    /// Ratings reduced by the decay sweep.
    pub static ref DECAY_ADJUSTMENTS_TOTAL: IntCounter = IntCounter::new(
        "karma_decay_adjustments_total",
        "Ratings reduced by the decay sweep",
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("karma_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "karma_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(DEDUP_CACHE_ENTRIES.clone()),
        Box::new(SCORE_EVENTS_TOTAL.clone()),
        Box::new(THROTTLE_CHECKS_TOTAL.clone()),
        Box::new(SPINS_TOTAL.clone()),
        Box::new(DECAY_ADJUSTMENTS_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        REGISTRY.register(c).expect("failed to register metric");
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Normalize a URL path for metric labels: replace numeric path segments with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
