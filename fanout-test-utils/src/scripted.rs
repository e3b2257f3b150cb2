//! Scripted, instrumented upstream source for tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fanout_core::{Repository, RepositoryId, RepositorySource, UpstreamError};

/// How a [`ScriptedSource`] picks the id of each successful fetch.
#[derive(Debug, Clone)]
pub enum IdPlan {
    /// `start`, `start + 1`, ... in the order successes happen.
    Sequential { start: RepositoryId },
    /// Repeats the listed ids in order.
    Cycle(Vec<RepositoryId>),
    /// Every success returns the same id.
    Constant(RepositoryId),
}

impl IdPlan {
    fn id_for(&self, success_index: u64) -> RepositoryId {
        match self {
            IdPlan::Sequential { start } => start + success_index as RepositoryId,
            IdPlan::Cycle(ids) if ids.is_empty() => 0,
            IdPlan::Cycle(ids) => ids[(success_index % ids.len() as u64) as usize],
            IdPlan::Constant(id) => *id,
        }
    }
}

/// Which calls of a [`ScriptedSource`] fail.
#[derive(Debug, Clone, Copy)]
pub enum FailurePlan {
    Never,
    Always,
    /// The first `n` calls fail, the rest succeed.
    FirstN(u64),
    /// Every `n`th call (1-based) fails.
    EveryNth(u64),
}

impl FailurePlan {
    fn fails(&self, call_index: u64) -> bool {
        match *self {
            FailurePlan::Never => false,
            FailurePlan::Always => true,
            FailurePlan::FirstN(n) => call_index < n,
            FailurePlan::EveryNth(0) => false,
            FailurePlan::EveryNth(n) => (call_index + 1) % n == 0,
        }
    }
}

/// A [`RepositorySource`] with scripted latency, ids and failures.
///
/// Tracks how many calls are in flight at once, including calls that are
/// aborted by dropping their future, so tests can check the permit bound.
#[derive(Debug)]
pub struct ScriptedSource {
    latency: Duration,
    ids: IdPlan,
    failures: FailurePlan,
    calls: AtomicU64,
    successes: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSource {
    /// Instant, always-successful source handing out ids 1, 2, 3, ...
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            ids: IdPlan::Sequential { start: 1 },
            failures: FailurePlan::Never,
            calls: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_ids(mut self, ids: IdPlan) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_failures(mut self, failures: FailurePlan) -> Self {
        self.failures = failures;
        self
    }

    /// Total calls started.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that returned a repository.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }

    /// Calls that returned a scripted failure.
    pub fn failures(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RepositorySource for ScriptedSource {
    async fn fetch_repository(&self) -> Result<Repository, UpstreamError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard::enter(&self.in_flight, &self.peak_in_flight);

        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }

        if self.failures.fails(call) {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(UpstreamError::Status { status: 500 });
        }

        let index = self.successes.fetch_add(1, Ordering::SeqCst);
        let id = self.ids.id_for(index);
        Ok(Repository::new(id, format!("repo-{}", id), Utc::now()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
