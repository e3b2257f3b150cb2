//! Fanout Storage
//!
//! In-process storage for every distinct repository the service has ever
//! fetched. The cache never evicts or expires entries; it exists so that a
//! request whose live fetches miss the deadline can be backfilled with
//! previously-seen records.

pub mod cache;

pub use cache::{CacheResult, CacheStats, RepositoryCache};
