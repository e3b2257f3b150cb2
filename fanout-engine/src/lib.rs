//! Fanout Engine
//!
//! The concurrent core of the aggregator:
//! - [`PermitPool`]: process-wide bound on simultaneous upstream calls
//! - [`slot`]: the per-slot retry state machine
//! - [`Aggregator`]: fan-out, deadline-bounded collection, cache backfill
//! - [`EngineStats`]: lock-free counters for metrics

pub mod aggregator;
pub mod permits;
pub mod slot;
pub mod stats;

pub use aggregator::{
    AggregateOutcome, AggregateRequest, Aggregator, StopReason, MAX_AGGREGATE_COUNT,
};
pub use permits::{Permit, PermitPool};
pub use slot::{SlotState, Verdict};
pub use stats::{AttemptOutcome, EngineStats, EngineStatsSnapshot};
