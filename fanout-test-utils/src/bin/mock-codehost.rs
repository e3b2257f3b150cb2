//! Mock code host entry point
//!
//! Serves `GET /repository` with configurable latency and failure rate so
//! the fanout API can be exercised without the real upstream.

use std::net::SocketAddr;

use fanout_test_utils::{mock_codehost_router, MockCodeHostConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let config = MockCodeHostConfig::from_env();
    let addr: SocketAddr = std::env::var("MOCK_CODEHOST_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:7080".to_string())
        .parse()?;

    tracing::info!(
        %addr,
        id_space = config.id_space,
        latency_ms = config.latency.as_millis() as u64,
        failure_rate = config.failure_rate,
        "Starting mock code host"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, mock_codehost_router(config));
    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
