//! Constants for the fanout API
//!
//! Defaults for every environment-driven setting and query parameter live
//! here so config, parsing and tests agree on them.

use std::time::Duration;

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

// ============================================================================
// ENGINE
// ============================================================================

/// Default number of simultaneous upstream calls across all requests
pub const DEFAULT_PERMIT_CAPACITY: usize = 10;

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// `count` used when the parameter is missing or unparsable
pub const DEFAULT_COUNT: i64 = 1;

/// Cap on `count` unless `FANOUT_MAX_COUNT` overrides it
pub const DEFAULT_MAX_COUNT: usize = 1_000;

/// `timeout` used when the parameter is missing or unparsable (5 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The only `unique` value that enables deduplication
pub const UNIQUE_ENABLED: &str = "true";

// ============================================================================
// RESPONSES
// ============================================================================

/// Content type of `/repositories` responses
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
