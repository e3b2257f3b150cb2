//! REST API Routes Module
//!
//! - `/repositories`: the aggregation endpoint
//! - `/health/*`: liveness and readiness checks
//! - `/metrics`: Prometheus exposition

pub mod health;
pub mod repositories;

use axum::{middleware::from_fn, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Build the complete application router.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .merge(repositories::create_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
