//! Aggregator
//!
//! Fans a request for `count` repositories out to `count` slots, collects
//! what they emit until the response is full or the deadline passes, and
//! fills any shortfall with random cached repositories.
//!
//! Every repository accepted from a slot is written to the cache, and so is
//! anything still queued when collection stops. Later requests can backfill
//! from records this request never used.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fanout_core::{CacheError, Repository, RepositoryId, SharedSource};
use fanout_storage::RepositoryCache;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::permits::PermitPool;
use crate::slot::{Emission, Slot, Verdict};
use crate::stats::EngineStats;

// ============================================================================
// REQUEST / OUTCOME
// ============================================================================

/// Largest `count` a single aggregation serves. Larger requests are clamped.
pub const MAX_AGGREGATE_COUNT: usize = 10_000;

/// One aggregation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateRequest {
    /// Number of repositories wanted. Zero yields an empty outcome; values
    /// above [`MAX_AGGREGATE_COUNT`] are clamped to it.
    pub count: usize,
    /// Reject repositories whose id is already in the response.
    pub unique: bool,
    /// How long live collection may run.
    pub timeout: Duration,
}

impl AggregateRequest {
    pub fn new(count: usize, unique: bool, timeout: Duration) -> Self {
        Self {
            count,
            unique,
            timeout,
        }
    }
}

/// Why live collection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The response reached `count` from live fetches.
    Filled,
    /// The timeout elapsed first.
    DeadlineElapsed,
    /// The caller's token fired.
    CallerCanceled,
    /// Every slot ended without filling the response.
    WorkersExhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Filled => "filled",
            StopReason::DeadlineElapsed => "deadline_elapsed",
            StopReason::CallerCanceled => "caller_canceled",
            StopReason::WorkersExhausted => "workers_exhausted",
        }
    }
}

/// Result of one aggregation.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    /// Live repositories in arrival order, then backfilled ones.
    pub repositories: Vec<Repository>,
    /// Repositories taken from slots.
    pub live: usize,
    /// Repositories drawn from the cache.
    pub backfilled: usize,
    /// Emissions rejected as duplicates.
    pub duplicates: usize,
    /// Emissions queued after collection stopped, cached but not used.
    pub late_arrivals: usize,
    pub stop: StopReason,
}

impl AggregateOutcome {
    fn empty() -> Self {
        Self {
            repositories: Vec::new(),
            live: 0,
            backfilled: 0,
            duplicates: 0,
            late_arrivals: 0,
            stop: StopReason::Filled,
        }
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Per-request working state.
struct Collection {
    count: usize,
    seen: Option<HashSet<RepositoryId>>,
    repositories: Vec<Repository>,
    next_ticket: u64,
    duplicates: usize,
}

impl Collection {
    fn is_full(&self) -> bool {
        self.repositories.len() >= self.count
    }
}

/// Shared entry point for aggregation.
///
/// Cheap to clone. Every clone shares the same source, cache, permit pool
/// and counters, so the permit bound holds across concurrent requests.
#[derive(Clone)]
pub struct Aggregator {
    source: SharedSource,
    cache: Arc<RepositoryCache>,
    permits: PermitPool,
    stats: Arc<EngineStats>,
}

impl Aggregator {
    pub fn new(source: SharedSource, cache: Arc<RepositoryCache>, permits: PermitPool) -> Self {
        Self {
            source,
            cache,
            permits,
            stats: Arc::new(EngineStats::new()),
        }
    }

    pub fn cache(&self) -> &Arc<RepositoryCache> {
        &self.cache
    }

    pub fn permits(&self) -> &PermitPool {
        &self.permits
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Collect up to `request.count` repositories.
    ///
    /// Never fails: upstream failures are retried by the slots, and a
    /// shortfall the cache cannot cover just makes the result shorter.
    /// `caller` ends both collection and backfill; the timeout ends only
    /// collection.
    pub async fn aggregate(
        &self,
        request: AggregateRequest,
        caller: &CancellationToken,
    ) -> AggregateOutcome {
        if request.count == 0 {
            return AggregateOutcome::empty();
        }

        let started = Instant::now();
        let count = request.count.min(MAX_AGGREGATE_COUNT);
        if count < request.count {
            tracing::warn!(
                requested = request.count,
                count,
                "Requested count clamped"
            );
        }
        let fetch = caller.child_token();
        let (tx, mut rx) = mpsc::channel::<Emission>(count);

        let mut slots = JoinSet::new();
        for index in 0..count {
            let slot = Slot::new(
                index,
                Arc::clone(&self.source),
                self.permits.clone(),
                Arc::clone(&self.stats),
                tx.clone(),
                fetch.clone(),
            );
            slots.spawn(slot.run());
        }
        drop(tx);

        let mut collection = Collection {
            count,
            seen: request.unique.then(HashSet::new),
            repositories: Vec::with_capacity(count),
            next_ticket: count as u64,
            duplicates: 0,
        };

        let deadline = tokio::time::sleep(request.timeout);
        tokio::pin!(deadline);

        let stop = loop {
            if collection.is_full() {
                break StopReason::Filled;
            }

            tokio::select! {
                biased;
                _ = caller.cancelled() => break StopReason::CallerCanceled,
                _ = &mut deadline => {
                    tracing::debug!(
                        timeout_ms = request.timeout.as_millis() as u64,
                        collected = collection.repositories.len(),
                        "Deadline elapsed"
                    );
                    break StopReason::DeadlineElapsed;
                }
                emission = rx.recv() => match emission {
                    Some(emission) => self.collect(&mut collection, emission),
                    None => break StopReason::WorkersExhausted,
                },
            }
        };
        let live = collection.repositories.len();

        // No slot may send once the drain starts.
        fetch.cancel();
        slots.abort_all();
        while slots.join_next().await.is_some() {}
        let late_arrivals = self.drain_late_arrivals(&mut rx);

        let backfilled = if collection.is_full() {
            0
        } else {
            self.backfill(&mut collection, caller)
        };

        self.stats.record_aggregation();

        let outcome = AggregateOutcome {
            repositories: collection.repositories,
            live,
            backfilled,
            duplicates: collection.duplicates,
            late_arrivals,
            stop,
        };

        tracing::info!(
            count,
            unique = request.unique,
            timeout_ms = request.timeout.as_millis() as u64,
            returned = outcome.len(),
            live = outcome.live,
            backfilled = outcome.backfilled,
            duplicates = outcome.duplicates,
            late_arrivals = outcome.late_arrivals,
            stop = outcome.stop.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation finished"
        );

        outcome
    }

    fn collect(&self, collection: &mut Collection, emission: Emission) {
        let Emission {
            slot,
            ticket,
            repository,
            verdict,
        } = emission;

        if let Some(seen) = collection.seen.as_mut() {
            if !seen.insert(repository.id) {
                let fresh = collection.next_ticket;
                collection.next_ticket += 1;
                collection.duplicates += 1;
                tracing::debug!(
                    slot,
                    ticket,
                    repository_id = repository.id,
                    "Duplicate repository discarded"
                );
                // A closed verdict channel means the slot is already gone.
                let _ = verdict.send(Verdict::Duplicate { ticket: fresh });
                return;
            }
        }

        self.remember(repository.clone());
        collection.repositories.push(repository);
        let _ = verdict.send(Verdict::Accepted);
    }

    /// Cache whatever slots queued before they saw the cancellation.
    fn drain_late_arrivals(&self, rx: &mut mpsc::Receiver<Emission>) -> usize {
        let mut drained = 0;
        while let Ok(emission) = rx.try_recv() {
            self.remember(emission.repository);
            drained += 1;
        }
        drained
    }

    fn backfill(&self, collection: &mut Collection, caller: &CancellationToken) -> usize {
        let wanted = collection.count - collection.repositories.len();
        tracing::debug!(wanted, "Backfilling from cache");

        let mut drawn = 0;
        while !collection.is_full() {
            if caller.is_cancelled() {
                tracing::debug!(drawn, "Backfill stopped by caller");
                break;
            }

            match self.cache.get_random(collection.seen.as_ref()) {
                Ok(repository) => {
                    if let Some(seen) = collection.seen.as_mut() {
                        seen.insert(repository.id);
                    }
                    collection.repositories.push(repository);
                    drawn += 1;
                }
                Err(CacheError::Empty) => {
                    tracing::debug!(drawn, wanted, "Cache exhausted during backfill");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, drawn, "Backfill aborted");
                    break;
                }
            }
        }
        drawn
    }

    fn remember(&self, repository: Repository) {
        if let Err(e) = self.cache.add(repository) {
            tracing::warn!(error = %e, "Failed to cache repository");
        }
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("source", &self.source.name())
            .field("permits", &self.permits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_test_utils::{all_ids_unique, seeded_cache, IdPlan, ScriptedSource};

    fn aggregator(source: ScriptedSource, cache: RepositoryCache) -> Aggregator {
        Aggregator::new(Arc::new(source), Arc::new(cache), PermitPool::new(10))
    }

    #[tokio::test]
    async fn test_zero_count_spawns_nothing() {
        let source = Arc::new(ScriptedSource::new());
        let agg = Aggregator::new(
            Arc::clone(&source) as SharedSource,
            Arc::new(RepositoryCache::new()),
            PermitPool::new(10),
        );

        let outcome = agg
            .aggregate(
                AggregateRequest::new(0, true, Duration::from_secs(1)),
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_live_records_are_cached() {
        let agg = aggregator(ScriptedSource::new(), RepositoryCache::new());

        let outcome = agg
            .aggregate(
                AggregateRequest::new(4, false, Duration::from_secs(5)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.len(), 4);
        assert_eq!(outcome.live, 4);
        assert_eq!(outcome.stop, StopReason::Filled);
        for repo in &outcome.repositories {
            assert!(matches!(agg.cache().get(repo.id), Ok(Some(_))));
        }
    }

    #[tokio::test]
    async fn test_duplicates_counted_and_refetched() {
        let source = ScriptedSource::new().with_ids(IdPlan::Cycle(vec![1, 1, 2, 2, 3]));
        let agg = Aggregator::new(
            Arc::new(source),
            Arc::new(RepositoryCache::new()),
            PermitPool::new(1),
        );

        let outcome = agg
            .aggregate(
                AggregateRequest::new(3, true, Duration::from_secs(5)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.len(), 3);
        assert!(all_ids_unique(&outcome.repositories));
        assert_eq!(outcome.duplicates, 2);
    }

    #[tokio::test]
    async fn test_non_unique_keeps_duplicates() {
        let source = ScriptedSource::new().with_ids(IdPlan::Constant(9));
        let agg = aggregator(source, RepositoryCache::new());

        let outcome = agg
            .aggregate(
                AggregateRequest::new(3, false, Duration::from_secs(5)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.len(), 3);
        assert!(outcome.repositories.iter().all(|r| r.id == 9));
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(agg.cache().len().ok(), Some(1));
    }

    #[tokio::test]
    async fn test_unique_backfill_skips_seen_ids() {
        // Live fetching only ever yields id 1; the cache also holds 1, 2, 3.
        let source = ScriptedSource::new().with_ids(IdPlan::Constant(1));
        let agg = aggregator(source, seeded_cache([1, 2, 3]));

        let outcome = agg
            .aggregate(
                AggregateRequest::new(3, true, Duration::from_millis(100)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.len(), 3);
        assert!(all_ids_unique(&outcome.repositories));
        assert_eq!(outcome.live, 1);
        assert_eq!(outcome.backfilled, 2);
        assert_eq!(outcome.stop, StopReason::DeadlineElapsed);
    }
}
