//! Process-wide Prometheus collectors for the tally service.
//!
//! Request, checkout, cache and ingest series, registered once in the default
//! registry and rendered by `GET /metrics`.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// Request latency buckets, 1ms to 10s.
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Checkout wait buckets (seconds), finer at the low end where uncontended waits land.
const CHECKOUT_WAIT_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 30.0,
];

/// Registered on first use. Registration failure disables metrics.
pub static METRICS: Lazy<ApiResult<TallyMetrics>> = Lazy::new(TallyMetrics::new);

/// The registered metrics, if registration succeeded.
pub fn metrics() -> Option<&'static TallyMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all tally metrics.
#[derive(Clone)]
pub struct TallyMetrics {
    /// Requests by method, route template and status.
    pub http_requests_total: CounterVec,

    /// Request latency by method and route template.
    pub http_request_duration_seconds: HistogramVec,

    /// Time spent waiting for a store's exclusive checkout
    pub checkout_wait_seconds: Histogram,

    /// Result cache lookups - labels: outcome (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Ingested records - labels: route (standard/special), status
    pub inserts_total: CounterVec,

    /// Stores currently held open
    pub open_stores: Gauge,
}

impl TallyMetrics {
    /// Register every collector in the default registry.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "tally_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "tally_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            checkout_wait_seconds: register_histogram!(
                "tally_checkout_wait_seconds",
                "Time spent waiting for an exclusive store checkout",
                CHECKOUT_WAIT_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register checkout_wait_seconds: {}", e)))?,

            cache_lookups_total: register_counter_vec!(
                "tally_cache_lookups_total",
                "Result cache lookups by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e)))?,

            inserts_total: register_counter_vec!(
                "tally_inserts_total",
                "Total ingested records",
                &["route", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register inserts_total: {}", e)))?,

            open_stores: register_gauge!(
                "tally_open_stores",
                "Number of stores currently held open"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register open_stores: {}", e)))?,
        })
    }

    /// Count one finished request and observe its latency.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record how long a checkout waited for its store.
    pub fn record_checkout_wait(&self, waited_secs: f64) {
        self.checkout_wait_seconds.observe(waited_secs);
    }

    /// Record a result cache lookup.
    pub fn record_cache_lookup(&self, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[outcome]).inc();
    }

    /// Record an insert attempt.
    pub fn record_insert(&self, route: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.inserts_total.with_label_values(&[route, status]).inc();
    }

    /// Set the open store count.
    pub fn set_open_stores(&self, count: usize) {
        self.open_stores.set(count as f64);
    }
}

/// GET /metrics - text exposition of the default registry.
pub async fn metrics_handler() -> impl IntoResponse {
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

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_broker_metrics() -> Result<(), String> {
        let metrics = metrics().ok_or("Metrics init failed")?;
        metrics.record_http_request("GET", "/:store/:property", 200, 0.015);
        metrics.record_checkout_wait(0.0002);
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_insert("standard", true);
        metrics.set_open_stores(3);
        assert_eq!(metrics.open_stores.get(), 3.0);
        Ok(())
    }
}
