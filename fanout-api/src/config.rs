//! API Configuration Module
//!
//! Server and aggregation settings loaded from environment variables with
//! defaults suitable for local development. The upstream client carries its
//! own [`fanout_upstream::UpstreamConfig`].

use std::net::SocketAddr;
use std::time::Duration;

use fanout_core::ConfigError;

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_COUNT, DEFAULT_MAX_COUNT, DEFAULT_PERMIT_CAPACITY, DEFAULT_PORT,
    DEFAULT_TIMEOUT,
};
use crate::types::QueryDefaults;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Server and aggregation configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Host to bind the listener to.
    pub bind_host: String,

    /// Port to listen on.
    pub port: u16,

    /// Simultaneous upstream calls allowed across all requests (at least 1).
    pub permit_capacity: usize,

    /// `count` used when the query omits it or it does not parse.
    pub default_count: i64,

    /// `timeout` used when the query omits it or it does not parse.
    pub default_timeout: Duration,

    /// Operator cap on `count`.
    pub max_count: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            permit_capacity: DEFAULT_PERMIT_CAPACITY,
            default_count: DEFAULT_COUNT,
            default_timeout: DEFAULT_TIMEOUT,
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `FANOUT_API_BIND`: bind host (default: 0.0.0.0)
    /// - `PORT` / `FANOUT_API_PORT`: listen port (default: 8080)
    /// - `FANOUT_PERMIT_CAPACITY`: global permit pool size (default: 10, min 1)
    /// - `FANOUT_DEFAULT_COUNT`: default `count` (default: 1)
    /// - `FANOUT_DEFAULT_TIMEOUT`: default `timeout`, e.g. "5s" (default: 5s)
    /// - `FANOUT_MAX_COUNT`: cap on `count` (default: 1000)
    ///
    /// Only an unusable port is fatal; every other bad value falls back to
    /// its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_host = lookup("FANOUT_API_BIND")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.bind_host);

        let port = match lookup("PORT").or_else(|| lookup("FANOUT_API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "PORT".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            None => defaults.port,
        };

        let permit_capacity = lookup("FANOUT_PERMIT_CAPACITY")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(defaults.permit_capacity)
            .max(1);

        let default_count = lookup("FANOUT_DEFAULT_COUNT")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(defaults.default_count);

        let default_timeout = lookup("FANOUT_DEFAULT_TIMEOUT")
            .and_then(|s| humantime::parse_duration(s.trim()).ok())
            .unwrap_or(defaults.default_timeout);

        let max_count = lookup("FANOUT_MAX_COUNT")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_count);

        Ok(Self {
            bind_host,
            port,
            permit_capacity,
            default_count,
            default_timeout,
            max_count,
        })
    }

    /// Configuration for local runs: loopback only, short default timeout.
    pub fn development() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            default_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Resolve the socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "FANOUT_API_BIND".to_string(),
                value: addr.clone(),
                reason: e.to_string(),
            })
    }

    /// Fallbacks applied to `/repositories` query parameters.
    pub fn query_defaults(&self) -> QueryDefaults {
        QueryDefaults {
            count: self.default_count,
            timeout: self.default_timeout,
            max_count: self.max_count,
        }
    }
}
