//! Engine counters.
//!
//! Plain atomics so the engine stays free of any metrics backend. The API
//! layer copies [`EngineStats::snapshot`] into Prometheus at scrape time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for upstream attempts and aggregations since startup.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Upstream calls started.
    pub attempts: AtomicU64,
    /// Upstream calls that returned a repository.
    pub successes: AtomicU64,
    /// Upstream calls that failed and were retried.
    pub failures: AtomicU64,
    /// Upstream calls cut short by cancellation.
    pub aborted: AtomicU64,
    /// Upstream calls currently holding a permit.
    pub in_flight: AtomicU64,
    /// Highest `in_flight` ever observed.
    pub peak_in_flight: AtomicU64,
    /// Aggregations completed.
    pub aggregations: AtomicU64,
}

/// How an upstream attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
    Aborted,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an attempt as started. The returned guard keeps it in flight.
    ///
    /// A guard dropped without [`AttemptGuard::finish`] counts as aborted.
    pub fn begin_attempt(&self) -> AttemptGuard<'_> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        AttemptGuard {
            stats: self,
            outcome: AttemptOutcome::Aborted,
        }
    }

    pub fn record_aggregation(&self) {
        self.aggregations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
            aggregations: self.aggregations.load(Ordering::Relaxed),
        }
    }
}

/// In-flight marker for one upstream attempt.
pub struct AttemptGuard<'a> {
    stats: &'a EngineStats,
    outcome: AttemptOutcome,
}

impl AttemptGuard<'_> {
    /// Record how the attempt ended and leave flight.
    pub fn finish(mut self, outcome: AttemptOutcome) {
        self.outcome = outcome;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        let counter = match self.outcome {
            AttemptOutcome::Success => &self.stats.successes,
            AttemptOutcome::Failure => &self.stats.failures,
            AttemptOutcome::Aborted => &self.stats.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of engine counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub aborted: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
    pub aggregations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_lifecycle() {
        let stats = EngineStats::new();

        let first = stats.begin_attempt();
        let second = stats.begin_attempt();
        assert_eq!(stats.snapshot().in_flight, 2);

        first.finish(AttemptOutcome::Success);
        second.finish(AttemptOutcome::Failure);

        let snap = stats.snapshot();
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.in_flight, 0);
        assert_eq!(snap.peak_in_flight, 2);
    }

    #[test]
    fn test_dropped_guard_counts_as_aborted() {
        let stats = EngineStats::new();
        drop(stats.begin_attempt());

        let snap = stats.snapshot();
        assert_eq!(snap.aborted, 1);
        assert_eq!(snap.in_flight, 0);
    }
}
