//! Fanout Test Utilities
//!
//! Centralized test infrastructure for the fanout workspace:
//! - Proptest generators for repositories and query parameters
//! - A scripted, instrumented upstream source
//! - A mock code host (router, spawnable server, and `mock-codehost` binary)
//! - Fixtures for common scenarios

pub mod codehost;
pub mod scripted;

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

// Re-export core types for convenience
pub use fanout_core::{
    CacheError, FanoutError, FanoutResult, Repository, RepositoryId, RepositorySource,
    SharedSource, Timestamp, UpstreamError,
};
pub use fanout_storage::RepositoryCache;

pub use codehost::{mock_codehost_router, MockCodeHost, MockCodeHostConfig, MockMode};
pub use scripted::{FailurePlan, IdPlan, ScriptedSource};

// ============================================================================
// FIXTURES
// ============================================================================

/// Fixed timestamp used by fixtures, so equal inputs give equal records.
pub fn fixture_time() -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// A repository named `repo-{id}`.
pub fn repository(id: RepositoryId) -> Repository {
    Repository::new(id, format!("repo-{}", id), fixture_time())
}

/// A cache pre-populated with `repo-{id}` for every id.
pub fn seeded_cache(ids: impl IntoIterator<Item = RepositoryId>) -> RepositoryCache {
    let cache = RepositoryCache::new();
    for id in ids {
        let _ = cache.add(repository(id));
    }
    cache
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// True when no two repositories share an id.
pub fn all_ids_unique(repositories: &[Repository]) -> bool {
    let mut seen = HashSet::with_capacity(repositories.len());
    repositories.iter().all(|r| seen.insert(r.id))
}

/// Ids of `repositories`, in order.
pub fn ids_of(repositories: &[Repository]) -> Vec<RepositoryId> {
    repositories.iter().map(|r| r.id).collect()
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Generate an arbitrary repository.
pub fn arb_repository() -> impl Strategy<Value = Repository> {
    (1i64..10_000, "[a-z][a-z0-9-]{0,20}", 0i64..2_000_000_000).prop_map(|(id, name, secs)| {
        let fetched_at = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Repository::new(id, name, fetched_at)
    })
}

/// Generate raw `count` query values, well-formed or not.
pub fn arb_count_param() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        (-50i64..50).prop_map(|n| Some(n.to_string())),
        "[a-z]{1,5}".prop_map(Some),
        Just(Some(String::new())),
    ]
}

/// Generate raw `unique` query values.
pub fn arb_unique_param() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("true".to_string())),
        Just(Some("false".to_string())),
        Just(Some("TRUE".to_string())),
        Just(Some("1".to_string())),
        "[a-z]{0,6}".prop_map(Some),
    ]
}

/// Generate raw `timeout` query values.
pub fn arb_timeout_param() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        (1u64..5_000).prop_map(|ms| Some(format!("{}ms", ms))),
        (1u64..30).prop_map(|s| Some(format!("{}s", s))),
        Just(Some("-1s".to_string())),
        "[a-z]{1,4}".prop_map(Some),
    ]
}
