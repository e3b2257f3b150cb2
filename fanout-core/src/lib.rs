//! Fanout Core - Record Types
//!
//! Pure data structures shared by every other crate in the workspace:
//! the aggregated [`Repository`] record, its identity and timestamp
//! aliases, the error taxonomy, and the [`RepositorySource`] seam that
//! upstream clients implement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

pub mod error;
pub mod source;

pub use error::{CacheError, ConfigError, FanoutError, FanoutResult, UpstreamError};
pub use source::{RepositorySource, SharedSource};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Stable integer identity of a repository as reported by the upstream.
pub type RepositoryId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// RECORD
// ============================================================================

/// The record proxied from the upstream code host.
///
/// Records are created only by a successful upstream fetch and never
/// mutated afterwards. Equality and hashing consider the `id` alone, so two
/// fetches of the same repository compare equal even if their `fetched_at`
/// differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    #[serde(rename = "fetchedAt")]
    pub fetched_at: Timestamp,
}

impl Repository {
    pub fn new(id: RepositoryId, name: impl Into<String>, fetched_at: Timestamp) -> Self {
        Self {
            id,
            name: name.into(),
            fetched_at,
        }
    }
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Repository {}

impl Hash for Repository {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// TESTS
// ============================================================================
