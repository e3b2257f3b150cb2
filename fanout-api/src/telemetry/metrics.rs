//! Prometheus Metrics Definitions
//!
//! Defines all fanout metrics with their labels and types, and exposes the
//! /metrics endpoint for Prometheus scraping.
//!
//! Engine counters live in [`EngineStats`](fanout_engine::EngineStats) as
//! plain atomics. They are copied into the registry at scrape time.

use std::sync::Mutex;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use fanout_engine::{AggregateOutcome, Aggregator, EngineStatsSnapshot};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized on first use
pub static METRICS: Lazy<ApiResult<FanoutMetrics>> = Lazy::new(FanoutMetrics::new);

/// Container for all fanout metrics.
pub struct FanoutMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: IntCounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Records returned to clients - labels: origin (live/cache)
    pub repositories_served_total: IntCounterVec,

    /// Records discarded because their id was already in a unique response
    pub duplicates_discarded_total: IntCounter,

    /// Completed aggregations - labels: stop
    pub aggregations_total: IntCounterVec,

    /// Upstream attempts - labels: outcome (success/failure/aborted)
    pub upstream_attempts_total: IntCounterVec,

    /// Upstream calls currently holding a permit
    pub upstream_in_flight: IntGauge,

    /// Distinct records held by the cache
    pub cache_entries: IntGauge,

    sync_lock: Mutex<()>,
}

impl FanoutMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_int_counter_vec!(
                "fanout_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "fanout_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            repositories_served_total: register_int_counter_vec!(
                "fanout_repositories_served_total",
                "Repositories returned to clients by origin",
                &["origin"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register repositories_served_total: {}", e)))?,

            duplicates_discarded_total: register_int_counter!(
                "fanout_duplicates_discarded_total",
                "Fetched repositories discarded as duplicates in unique mode"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register duplicates_discarded_total: {}", e)))?,

            aggregations_total: register_int_counter_vec!(
                "fanout_aggregations_total",
                "Completed aggregations by stop reason",
                &["stop"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register aggregations_total: {}", e)))?,

            upstream_attempts_total: register_int_counter_vec!(
                "fanout_upstream_attempts_total",
                "Upstream fetch attempts by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upstream_attempts_total: {}", e)))?,

            upstream_in_flight: register_int_gauge!(
                "fanout_upstream_in_flight",
                "Upstream calls currently in flight"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upstream_in_flight: {}", e)))?,

            cache_entries: register_int_gauge!(
                "fanout_cache_entries",
                "Distinct repositories held by the cache"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_entries: {}", e)))?,

            sync_lock: Mutex::new(()),
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record the result of one aggregation.
    pub fn record_outcome(&self, outcome: &AggregateOutcome) {
        self.repositories_served_total
            .with_label_values(&["live"])
            .inc_by(outcome.live as u64);
        self.repositories_served_total
            .with_label_values(&["cache"])
            .inc_by(outcome.backfilled as u64);
        self.duplicates_discarded_total.inc_by(outcome.duplicates as u64);
        self.aggregations_total
            .with_label_values(&[outcome.stop.as_str()])
            .inc();
    }

    /// Bring the upstream counters up to `snapshot`.
    ///
    /// Counters only move forward; a snapshot behind the registry is ignored.
    pub fn sync_engine(&self, snapshot: &EngineStatsSnapshot) {
        let Ok(_guard) = self.sync_lock.lock() else {
            return;
        };
        for (outcome, total) in [
            ("success", snapshot.successes),
            ("failure", snapshot.failures),
            ("aborted", snapshot.aborted),
        ] {
            let counter = self.upstream_attempts_total.with_label_values(&[outcome]);
            let current = counter.get();
            if total > current {
                counter.inc_by(total - current);
            }
        }
        self.upstream_in_flight
            .set(i64::try_from(snapshot.in_flight).unwrap_or(i64::MAX));
    }

    /// Set the cache size gauge.
    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries
            .set(i64::try_from(entries).unwrap_or(i64::MAX));
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(aggregator): State<Aggregator>) -> impl IntoResponse {
    match METRICS.as_ref() {
        Ok(metrics) => {
            metrics.sync_engine(&aggregator.stats().snapshot());
            match aggregator.cache().len() {
                Ok(entries) => metrics.set_cache_entries(entries),
                Err(e) => tracing::warn!(error = %e, "cache size unavailable for metrics"),
            }
        }
        Err(e) => tracing::error!(error = %e, "metrics registry unavailable"),
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
