//! Repository Aggregation Endpoint
//!
//! `GET /repositories?count=<int>&unique=<true|false>&timeout=<duration>`
//!
//! Never fails on bad input: every parameter falls back to its default and
//! upstream trouble only shortens the list.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio_util::sync::CancellationToken;

use crate::constants::JSON_CONTENT_TYPE;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::telemetry::METRICS;
use crate::types::{ListRepositoriesQuery, RepositoriesResponse};

/// GET /repositories - Aggregate `count` repositories within `timeout`
pub async fn list_repositories(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let query = ListRepositoriesQuery::from_pairs(pairs);
    let request = query.to_request(&state.defaults);

    // Cancelled when this future is dropped, e.g. on client disconnect.
    let caller = CancellationToken::new();
    let _disconnect = caller.clone().drop_guard();

    let outcome = state.aggregator.aggregate(request, &caller).await;

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_outcome(&outcome);
    }

    let body = serde_json::to_vec(&RepositoriesResponse::from(outcome.repositories))?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response())
}

/// Create the repositories router.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/repositories", get(list_repositories))
}
