//! Error types for fanout operations

use thiserror::Error;

/// Upstream fetch failures.
///
/// Every variant is the same failure kind as far as retrying goes: a slot
/// retries on any of them. The variants exist so the log line says what
/// actually went wrong.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Invalid upstream URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Calling upstream failed: {reason}")]
    Transport { reason: String },

    #[error("Upstream responded {status}")]
    Status { status: u16 },

    #[error("Decoding upstream response failed: {reason}")]
    Decode { reason: String },

    #[error("Upstream call aborted by cancellation")]
    Aborted,
}

/// Repository cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("No repositories available")]
    Empty,

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all fanout errors.
#[derive(Debug, Clone, Error)]
pub enum FanoutError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for fanout operations.
pub type FanoutResult<T> = Result<T, FanoutError>;

// =============================================================================
// TESTS
// =============================================================================
