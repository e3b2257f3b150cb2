//! Upstream wire types

use fanout_core::Repository;
use serde::{Deserialize, Serialize};

/// Body returned by `GET {backend}/repository` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEnvelope {
    pub repository: Repository,
}
