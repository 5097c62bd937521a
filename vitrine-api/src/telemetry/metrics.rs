//! Prometheus Metrics Definitions
//!
//! Defines all Vitrine metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, register_int_gauge_vec,
    CounterVec, Encoder, HistogramVec, IntGauge, IntGaugeVec, TextEncoder,
};
use vitrine_cache::{CacheStats, ResponseCache};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Store operation latency buckets (seconds)
const STORE_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<VitrineMetrics>> = Lazy::new(VitrineMetrics::new);

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

/// Container for all Vitrine metrics.
#[derive(Clone)]
pub struct VitrineMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Session resolutions - labels: outcome
    pub session_resolutions_total: CounterVec,

    /// Store operation counter - labels: operation, status
    pub store_operations_total: CounterVec,

    /// Store operation duration histogram - labels: operation
    pub store_operation_duration_seconds: HistogramVec,

    /// Analytics events accepted - labels: kind
    pub analytics_events_total: CounterVec,

    /// Cumulative cache read counts sampled from `CacheStats` - labels: kind
    pub cache_reads: IntGaugeVec,

    /// Keys currently held by the response cache
    pub cache_entries: IntGauge,
}

impl VitrineMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "vitrine_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "vitrine_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            session_resolutions_total: register_counter_vec!(
                "vitrine_session_resolutions_total",
                "Session resolutions by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("session_resolutions_total", e))?,

            store_operations_total: register_counter_vec!(
                "vitrine_store_operations_total",
                "Total number of store operations",
                &["operation", "status"]
            )
            .map_err(|e| registration_error("store_operations_total", e))?,

            store_operation_duration_seconds: register_histogram_vec!(
                "vitrine_store_operation_duration_seconds",
                "Store operation duration in seconds",
                &["operation"],
                STORE_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("store_operation_duration_seconds", e))?,

            analytics_events_total: register_counter_vec!(
                "vitrine_analytics_events_total",
                "Analytics events accepted",
                &["kind"]
            )
            .map_err(|e| registration_error("analytics_events_total", e))?,

            cache_reads: register_int_gauge_vec!(
                "vitrine_cache_reads",
                "Cumulative response cache reads by kind",
                &["kind"]
            )
            .map_err(|e| registration_error("cache_reads", e))?,

            cache_entries: register_int_gauge!(
                "vitrine_cache_entries",
                "Keys currently held by the response cache"
            )
            .map_err(|e| registration_error("cache_entries", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_session_resolution(&self, outcome: &str) {
        self.session_resolutions_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a store operation.
    pub fn record_store_operation(&self, operation: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.store_operations_total
            .with_label_values(&[operation, status])
            .inc();
        self.store_operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_analytics_event(&self, kind: &str) {
        self.analytics_events_total.with_label_values(&[kind]).inc();
    }

    /// Copy a cache statistics snapshot into the gauges.
    pub fn observe_cache(&self, stats: &CacheStats) {
        let set = |kind: &str, value: u64| {
            self.cache_reads
                .with_label_values(&[kind])
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        };
        set("hit", stats.hits);
        set("miss", stats.misses);
        set("coalesced", stats.coalesced);
        set("stale", stats.stale_served);
        set("fetch_failure", stats.fetch_failures);
        set("invalidation", stats.invalidations);
        self.cache_entries
            .set(i64::try_from(stats.entry_count).unwrap_or(i64::MAX));
    }
}

/// Handler for GET /metrics endpoint.
///
/// Samples the response cache, then returns Prometheus text format metrics.
pub async fn metrics_handler(State(cache): State<ResponseCache>) -> impl IntoResponse {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.observe_cache(&cache.stats());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
