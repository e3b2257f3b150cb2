//! Upstream source trait.
//!
//! The concrete HTTP client lives in fanout-upstream. The engine only sees
//! this trait, which keeps it testable against scripted sources.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Repository, UpstreamError};

/// A single-record upstream.
///
/// One call performs exactly one fetch attempt. Implementations must be
/// cancel-safe: dropping the returned future aborts the attempt, which is
/// how a deadline reaches a call that is already in flight.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Fetch one repository from the upstream.
    async fn fetch_repository(&self) -> Result<Repository, UpstreamError>;

    /// Human-readable name used in logs.
    fn name(&self) -> &str {
        "upstream"
    }
}

/// Shared, type-erased source handed to the aggregator.
pub type SharedSource = Arc<dyn RepositorySource>;
