//! Fanout API - HTTP Layer
//!
//! Exposes the aggregation engine over axum:
//! - `GET /repositories`: fan out to the code host, dedupe, backfill from cache
//! - `GET /health/{ping,live,ready}`
//! - `GET /metrics`

pub mod config;
pub mod constants;
pub mod error;
pub mod macros;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;
pub use types::{ListRepositoriesQuery, QueryDefaults, RepositoriesResponse};
