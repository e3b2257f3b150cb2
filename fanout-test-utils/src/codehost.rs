//! Mock code host
//!
//! A fake upstream that serves `GET /repository` the way the real code host
//! does, plus the knobs needed to test against it:
//! - ids drawn at random from `1..=id_space`, so small spaces force duplicates
//! - fixed artificial latency
//! - a default failure rate, overridable per request via `?failure_rate=`
//! - fixed modes that always fail with a status or a malformed body

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use fanout_core::Repository;
use rand::Rng;
use serde::Deserialize;

/// What the mock does with each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Serve repositories, failing at the configured rate.
    Normal,
    /// Always answer with this status and an empty body.
    Status(u16),
    /// Always answer 200 with a body that is not a repository envelope.
    Malformed,
}

/// Mock code host configuration.
#[derive(Debug, Clone)]
pub struct MockCodeHostConfig {
    /// Ids are drawn from `1..=id_space`.
    pub id_space: i64,
    /// Delay before every response.
    pub latency: Duration,
    /// Failure rate used when the request has no `failure_rate` parameter.
    pub failure_rate: f64,
    pub mode: MockMode,
}

impl Default for MockCodeHostConfig {
    fn default() -> Self {
        Self {
            id_space: 1_000_000,
            latency: Duration::ZERO,
            failure_rate: 0.0,
            mode: MockMode::Normal,
        }
    }
}

impl MockCodeHostConfig {
    /// Create MockCodeHostConfig from environment variables.
    ///
    /// Environment variables:
    /// - `MOCK_CODEHOST_ID_SPACE`: size of the id space (default: 1000000)
    /// - `MOCK_CODEHOST_LATENCY`: response delay, e.g. "150ms" (default: 0)
    /// - `MOCK_CODEHOST_FAILURE_RATE`: default failure rate 0.0-1.0 (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let id_space = std::env::var("MOCK_CODEHOST_ID_SPACE")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.id_space);

        let latency = std::env::var("MOCK_CODEHOST_LATENCY")
            .ok()
            .and_then(|s| humantime::parse_duration(s.trim()).ok())
            .unwrap_or(defaults.latency);

        let failure_rate = std::env::var("MOCK_CODEHOST_FAILURE_RATE")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map(|rate| rate.clamp(0.0, 1.0))
            .unwrap_or(defaults.failure_rate);

        Self {
            id_space,
            latency,
            failure_rate,
            mode: MockMode::Normal,
        }
    }

    pub fn with_id_space(mut self, id_space: i64) -> Self {
        self.id_space = id_space.max(1);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Default)]
struct MockCounters {
    requests: AtomicU64,
    failures: AtomicU64,
    last_failure_rate: Mutex<Option<f64>>,
}

#[derive(Clone)]
struct MockState {
    config: Arc<MockCodeHostConfig>,
    counters: Arc<MockCounters>,
}

#[derive(Debug, Deserialize)]
struct RepositoryQuery {
    failure_rate: Option<f64>,
}

async fn get_repository(
    State(state): State<MockState>,
    Query(query): Query<RepositoryQuery>,
) -> Response {
    state.counters.requests.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut last) = state.counters.last_failure_rate.lock() {
        *last = query.failure_rate;
    }

    if !state.config.latency.is_zero() {
        tokio::time::sleep(state.config.latency).await;
    }

    match state.config.mode {
        MockMode::Status(code) => {
            state.counters.failures.fetch_add(1, Ordering::SeqCst);
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return status.into_response();
        }
        MockMode::Malformed => {
            return (StatusCode::OK, "{\"repository\": \"not-a-record\"").into_response();
        }
        MockMode::Normal => {}
    }

    let rate = query
        .failure_rate
        .unwrap_or(state.config.failure_rate)
        .max(0.0)
        .min(1.0);

    let (fail, id) = {
        let mut rng = rand::rng();
        (rng.random_bool(rate), rng.random_range(1..=state.config.id_space))
    };

    if fail {
        state.counters.failures.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(rate, "Injected upstream failure");
        return (StatusCode::INTERNAL_SERVER_ERROR, "injected failure").into_response();
    }

    let repository = Repository::new(id, format!("repo-{}", id), Utc::now());
    Json(serde_json::json!({ "repository": repository })).into_response()
}

/// Build the mock code host router and the counters it reports into.
fn build_router(config: MockCodeHostConfig) -> (Router, Arc<MockCounters>) {
    let counters = Arc::new(MockCounters::default());
    let state = MockState {
        config: Arc::new(config),
        counters: Arc::clone(&counters),
    };
    let router = Router::new()
        .route("/repository", get(get_repository))
        .with_state(state);
    (router, counters)
}

/// Create the mock code host router.
pub fn mock_codehost_router(config: MockCodeHostConfig) -> Router {
    build_router(config).0
}

/// A mock code host listening on a local port.
///
/// The server task is aborted when this value is dropped.
pub struct MockCodeHost {
    addr: SocketAddr,
    counters: Arc<MockCounters>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockCodeHost {
    /// Bind `127.0.0.1:0` and serve in a background task.
    pub async fn spawn(config: MockCodeHostConfig) -> std::io::Result<Self> {
        let (router, counters) = build_router(config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "Mock code host stopped");
            }
        });

        Ok(Self {
            addr,
            counters,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL to hand to the upstream client.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far.
    pub fn requests(&self) -> u64 {
        self.counters.requests.load(Ordering::SeqCst)
    }

    /// Requests answered with a failure so far.
    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::SeqCst)
    }

    /// `failure_rate` query parameter of the most recent request.
    pub fn last_failure_rate(&self) -> Option<f64> {
        self.counters
            .last_failure_rate
            .lock()
            .ok()
            .and_then(|last| *last)
    }
}

impl Drop for MockCodeHost {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
