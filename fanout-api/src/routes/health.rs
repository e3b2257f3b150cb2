//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check
//! - /health/ready - Engine readiness with cache and permit details

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use fanout_engine::Aggregator;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    /// `None` when the cache lock is poisoned.
    pub cache_entries: Option<usize>,
    pub permits: PermitHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitHealth {
    pub capacity: usize,
    pub available: usize,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
///
/// The service can always answer from whatever it has, so this stays 200.
/// A poisoned cache lock is reported as degraded.
pub async fn readiness(
    State(aggregator): State<Aggregator>,
    State(start_time): State<Instant>,
) -> impl IntoResponse {
    let cache_entries = match aggregator.cache().len() {
        Ok(entries) => Some(entries),
        Err(e) => {
            tracing::warn!(error = %e, "cache unavailable during readiness check");
            None
        }
    };

    let status = if cache_entries.is_some() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    let permits = aggregator.permits();
    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            cache_entries,
            permits: PermitHealth {
                capacity: permits.capacity(),
                available: permits.available(),
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: start_time.elapsed().as_secs(),
        }),
    };

    (StatusCode::OK, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}
