//! Slot worker state machine.
//!
//! A slot exists to put exactly one accepted repository into a response.
//! It retries the upstream until it gets one, re-arms when the aggregator
//! rejects its record as a duplicate, and stops as soon as its token
//! fires or the aggregator goes away.
//!
//! ```text
//! Waiting    --permit-----> Attempting
//! Waiting    --cancel-----> Canceled
//! Attempting --ok---------> Emitting
//! Attempting --failure----> Waiting
//! Attempting --aborted----> Canceled
//! Emitting   --Accepted---> Done
//! Emitting   --Duplicate--> Waiting
//! Emitting   --closed-----> Canceled
//! ```

use std::sync::Arc;

use fanout_core::{Repository, SharedSource, UpstreamError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::permits::{Permit, PermitPool};
use crate::stats::{AttemptOutcome, EngineStats};

/// The aggregator's answer to an emitted repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Kept in the response. The slot is finished.
    Accepted,
    /// Rejected as already seen. The slot tries again under `ticket`.
    Duplicate { ticket: u64 },
}

/// A repository offered to the aggregator by a slot.
#[derive(Debug)]
pub struct Emission {
    pub slot: usize,
    pub ticket: u64,
    pub repository: Repository,
    pub verdict: oneshot::Sender<Verdict>,
}

/// Where a slot is in its lifecycle.
#[derive(Debug)]
pub enum SlotState {
    /// Waiting for a permit from the pool.
    Waiting,
    /// Holding a permit for exactly one upstream call.
    Attempting(Permit),
    /// Holding a fetched repository, not yet judged.
    Emitting(Repository),
    Done,
    Canceled,
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SlotState::Done | SlotState::Canceled)
    }
}

/// One self-retrying fetch task.
pub struct Slot {
    index: usize,
    ticket: u64,
    source: SharedSource,
    permits: PermitPool,
    stats: Arc<EngineStats>,
    results: mpsc::Sender<Emission>,
    cancel: CancellationToken,
}

impl Slot {
    pub fn new(
        index: usize,
        source: SharedSource,
        permits: PermitPool,
        stats: Arc<EngineStats>,
        results: mpsc::Sender<Emission>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index,
            ticket: index as u64,
            source,
            permits,
            stats,
            results,
            cancel,
        }
    }

    /// Drive the slot until it reaches `Done` or `Canceled`.
    pub async fn run(mut self) -> SlotState {
        let mut state = SlotState::Waiting;
        while !state.is_terminal() {
            state = self.step(state).await;
        }

        match state {
            SlotState::Done => {
                tracing::debug!(slot = self.index, ticket = self.ticket, "Slot completed")
            }
            _ => tracing::debug!(slot = self.index, ticket = self.ticket, "Slot canceled"),
        }
        state
    }

    async fn step(&mut self, state: SlotState) -> SlotState {
        match state {
            SlotState::Waiting => match self.permits.acquire(&self.cancel).await {
                Some(permit) => SlotState::Attempting(permit),
                None => SlotState::Canceled,
            },
            SlotState::Attempting(permit) => self.attempt(permit).await,
            SlotState::Emitting(repository) => self.emit(repository).await,
            terminal => terminal,
        }
    }

    /// One upstream call. The permit is released as soon as the call ends.
    async fn attempt(&mut self, permit: Permit) -> SlotState {
        tracing::debug!(slot = self.index, ticket = self.ticket, "Attempt started");

        let guard = self.stats.begin_attempt();
        let result = tokio::select! {
            biased;
            result = self.source.fetch_repository() => result,
            _ = self.cancel.cancelled() => Err(UpstreamError::Aborted),
        };

        // Leave flight before the permit can reach another slot.
        guard.finish(match &result {
            Ok(_) => AttemptOutcome::Success,
            Err(UpstreamError::Aborted) => AttemptOutcome::Aborted,
            Err(_) => AttemptOutcome::Failure,
        });
        drop(permit);

        match result {
            Ok(repository) => SlotState::Emitting(repository),
            Err(UpstreamError::Aborted) => SlotState::Canceled,
            Err(e) => {
                tracing::warn!(
                    slot = self.index,
                    ticket = self.ticket,
                    source = self.source.name(),
                    error = %e,
                    "Upstream fetch failed, retrying"
                );
                SlotState::Waiting
            }
        }
    }

    /// Hand the repository to the aggregator and wait for its verdict.
    ///
    /// This runs even after cancellation, so a repository fetched just
    /// before the deadline can still reach the cache.
    async fn emit(&mut self, repository: Repository) -> SlotState {
        let (verdict_tx, verdict_rx) = oneshot::channel();
        let emission = Emission {
            slot: self.index,
            ticket: self.ticket,
            repository,
            verdict: verdict_tx,
        };

        if self.results.send(emission).await.is_err() {
            return SlotState::Canceled;
        }

        match verdict_rx.await {
            Ok(Verdict::Accepted) => SlotState::Done,
            Ok(Verdict::Duplicate { ticket }) => {
                tracing::debug!(
                    slot = self.index,
                    previous = self.ticket,
                    ticket,
                    "Duplicate discarded, slot re-armed"
                );
                self.ticket = ticket;
                SlotState::Waiting
            }
            Err(_) => SlotState::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_test_utils::{FailurePlan, ScriptedSource};
    use std::time::Duration;

    fn slot_for(
        source: Arc<ScriptedSource>,
        permits: PermitPool,
        cancel: CancellationToken,
    ) -> (Slot, mpsc::Receiver<Emission>, Arc<EngineStats>) {
        let (tx, rx) = mpsc::channel(1);
        let stats = Arc::new(EngineStats::new());
        let slot = Slot::new(0, source, permits, Arc::clone(&stats), tx, cancel);
        (slot, rx, stats)
    }

    #[tokio::test]
    async fn test_retries_until_success_then_done() {
        let source = Arc::new(ScriptedSource::new().with_failures(FailurePlan::FirstN(3)));
        let (slot, mut rx, stats) =
            slot_for(Arc::clone(&source), PermitPool::new(1), CancellationToken::new());

        let handle = tokio::spawn(slot.run());
        let emission = rx.recv().await;
        let emission = match emission {
            Some(emission) => emission,
            None => panic!("slot never emitted"),
        };
        assert_eq!(emission.repository.id, 1);
        let _ = emission.verdict.send(Verdict::Accepted);

        let state = handle.await.ok();
        assert!(matches!(state, Some(SlotState::Done)));
        assert_eq!(source.calls(), 4);
        assert_eq!(stats.snapshot().failures, 3);
        assert_eq!(stats.snapshot().successes, 1);
    }

    #[tokio::test]
    async fn test_duplicate_verdict_rearms_with_new_ticket() {
        let source = Arc::new(ScriptedSource::new());
        let (slot, mut rx, _stats) =
            slot_for(Arc::clone(&source), PermitPool::new(1), CancellationToken::new());

        let handle = tokio::spawn(slot.run());

        let first = rx.recv().await;
        let first = match first {
            Some(emission) => emission,
            None => panic!("slot never emitted"),
        };
        assert_eq!(first.ticket, 0);
        let _ = first.verdict.send(Verdict::Duplicate { ticket: 7 });

        let second = rx.recv().await;
        let second = match second {
            Some(emission) => emission,
            None => panic!("slot never re-emitted"),
        };
        assert_eq!(second.ticket, 7);
        assert_eq!(second.repository.id, 2);
        let _ = second.verdict.send(Verdict::Accepted);

        assert!(matches!(handle.await.ok(), Some(SlotState::Done)));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_permit() {
        let permits = PermitPool::new(1);
        let cancel = CancellationToken::new();
        let _held = permits.acquire(&CancellationToken::new()).await;

        let source = Arc::new(ScriptedSource::new());
        let (slot, _rx, _stats) = slot_for(Arc::clone(&source), permits, cancel.clone());
        let handle = tokio::spawn(slot.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert!(matches!(handle.await.ok(), Some(SlotState::Canceled)));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_call_and_frees_permit() {
        let permits = PermitPool::new(1);
        let cancel = CancellationToken::new();
        let source = Arc::new(ScriptedSource::new().with_latency(Duration::from_secs(3600)));
        let (slot, _rx, stats) = slot_for(Arc::clone(&source), permits.clone(), cancel.clone());
        let handle = tokio::spawn(slot.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.in_flight(), 1);
        cancel.cancel();

        assert!(matches!(handle.await.ok(), Some(SlotState::Canceled)));
        assert_eq!(source.in_flight(), 0);
        assert_eq!(permits.available(), 1);
        assert_eq!(stats.snapshot().aborted, 1);
    }

    #[tokio::test]
    async fn test_closed_verdict_channel_cancels() {
        let source = Arc::new(ScriptedSource::new());
        let (slot, mut rx, _stats) =
            slot_for(Arc::clone(&source), PermitPool::new(1), CancellationToken::new());
        let handle = tokio::spawn(slot.run());

        let emission = rx.recv().await;
        drop(emission);

        assert!(matches!(handle.await.ok(), Some(SlotState::Canceled)));
    }
}
