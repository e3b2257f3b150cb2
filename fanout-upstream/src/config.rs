//! Upstream client configuration.

use std::time::Duration;

/// Default upstream base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:7080";

/// Query parameter the code host reads for fault injection.
pub const FAILURE_RATE_PARAM: &str = "failure_rate";

/// Configuration for [`CodeHostClient`](crate::CodeHostClient).
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the code host API; `/repository` is appended.
    pub backend_url: String,

    /// Optional per-attempt timeout applied by reqwest.
    /// The request deadline still aborts attempts without it.
    pub request_timeout: Option<Duration>,

    /// Artificial failure rate (0.0 to 1.0) forwarded to the code host.
    /// Only useful against a backend that supports fault injection.
    pub failure_rate: Option<f64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout: None,
            failure_rate: None,
        }
    }
}

impl UpstreamConfig {
    /// Create UpstreamConfig from environment variables.
    ///
    /// Environment variables:
    /// - `FANOUT_BACKEND_URL`: upstream base URL (default: http://localhost:7080)
    /// - `FANOUT_UPSTREAM_REQUEST_TIMEOUT`: per-attempt timeout, e.g. "2s" (default: none)
    /// - `FANOUT_UPSTREAM_FAILURE_RATE`: fault-injection rate forwarded upstream (default: none)
    pub fn from_env() -> Self {
        let backend_url = std::env::var("FANOUT_BACKEND_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let request_timeout = std::env::var("FANOUT_UPSTREAM_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| humantime::parse_duration(s.trim()).ok());

        let failure_rate = std::env::var("FANOUT_UPSTREAM_FAILURE_RATE")
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|rate| (0.0..=1.0).contains(rate));

        Self {
            backend_url,
            request_timeout,
            failure_rate,
        }
    }

    /// Set the backend URL.
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the forwarded fault-injection rate.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = Some(rate.clamp(0.0, 1.0));
        self
    }
}
