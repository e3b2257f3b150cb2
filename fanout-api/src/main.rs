//! Fanout API Server Entry Point
//!
//! Bootstraps configuration, wires the upstream client, cache and permit
//! pool into one aggregator, and starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use fanout_api::telemetry::{init_tracer, TelemetryConfig};
use fanout_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState};
use fanout_core::SharedSource;
use fanout_engine::{Aggregator, PermitPool};
use fanout_storage::RepositoryCache;
use fanout_upstream::{CodeHostClient, UpstreamConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;
    let upstream_config = UpstreamConfig::from_env();

    let client = CodeHostClient::new(&upstream_config)?;
    tracing::info!(
        backend = %upstream_config.backend_url,
        failure_rate = ?upstream_config.failure_rate,
        permits = api_config.permit_capacity,
        "upstream configured"
    );

    let source: SharedSource = Arc::new(client);
    let cache = Arc::new(RepositoryCache::new());
    let permits = PermitPool::new(api_config.permit_capacity);
    let aggregator = Aggregator::new(source, cache, permits);

    let state = AppState::new(aggregator, api_config.query_defaults());
    let app: Router = create_api_router(state);

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, "Starting fanout API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
