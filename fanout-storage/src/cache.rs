//! Repository cache with uniform random sampling.
//!
//! The cache keeps two structures in sync under a single `RwLock`: a map
//! from id to record for lookups, and an insertion-ordered id list that
//! sampling indexes into. Inserts take the write lock, samples take the
//! read lock, so a sample always sees a consistent map/list pair.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use fanout_core::{CacheError, Repository, RepositoryId};
use rand::Rng;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Default)]
struct CacheInner {
    records: HashMap<RepositoryId, Repository>,
    /// Invariant: every id appears once, and exactly the keys of `records`.
    ids: Vec<RepositoryId>,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of distinct repositories held.
    pub entries: u64,
    /// Number of `add` calls that stored a new record.
    pub inserted: u64,
    /// Number of `add` calls ignored because the id was already present.
    pub ignored_duplicates: u64,
    /// Number of records handed out by `get_random`.
    pub draws: u64,
}

/// Global store of every distinct repository ever fetched.
///
/// Shared by all requests. Nothing is ever evicted.
#[derive(Debug, Default)]
pub struct RepositoryCache {
    inner: RwLock<CacheInner>,
    inserted: AtomicU64,
    ignored_duplicates: AtomicU64,
    draws: AtomicU64,
}

impl RepositoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a repository unless its id is already cached.
    ///
    /// The first-seen record wins: a later record with the same id is
    /// dropped, even if its other fields differ. Returns whether the record
    /// was stored.
    pub fn add(&self, repository: Repository) -> CacheResult<bool> {
        let mut inner = self.inner.write().map_err(|_| CacheError::LockPoisoned)?;

        if inner.records.contains_key(&repository.id) {
            self.ignored_duplicates.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        inner.ids.push(repository.id);
        inner.records.insert(repository.id, repository);
        self.inserted.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Pick a uniformly random cached repository whose id is not in `exclude`.
    ///
    /// `None` means nothing is excluded. Fails with [`CacheError::Empty`]
    /// when no candidate qualifies.
    pub fn get_random(&self, exclude: Option<&HashSet<RepositoryId>>) -> CacheResult<Repository> {
        self.get_random_with(exclude, &mut rand::rng())
    }

    /// [`get_random`](Self::get_random) with a caller-supplied RNG.
    pub fn get_random_with<R: Rng + ?Sized>(
        &self,
        exclude: Option<&HashSet<RepositoryId>>,
        rng: &mut R,
    ) -> CacheResult<Repository> {
        let inner = self.inner.read().map_err(|_| CacheError::LockPoisoned)?;

        let id = match exclude {
            None => {
                if inner.ids.is_empty() {
                    return Err(CacheError::Empty);
                }
                inner.ids[rng.random_range(0..inner.ids.len())]
            }
            Some(exclude) => {
                let available = inner.ids.iter().filter(|id| !exclude.contains(id)).count();
                if available == 0 {
                    return Err(CacheError::Empty);
                }
                let pick = rng.random_range(0..available);
                inner
                    .ids
                    .iter()
                    .filter(|id| !exclude.contains(id))
                    .nth(pick)
                    .copied()
                    .ok_or(CacheError::Empty)?
            }
        };

        let repository = inner.records.get(&id).cloned().ok_or(CacheError::Empty)?;
        self.draws.fetch_add(1, Ordering::Relaxed);
        Ok(repository)
    }

    /// Look up a cached repository by id.
    pub fn get(&self, id: RepositoryId) -> CacheResult<Option<Repository>> {
        let inner = self.inner.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(inner.records.get(&id).cloned())
    }

    /// Number of distinct repositories held.
    pub fn len(&self) -> CacheResult<usize> {
        let inner = self.inner.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(inner.ids.len())
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Get a snapshot of cache statistics.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let entries = self.len()? as u64;
        Ok(CacheStats {
            entries,
            inserted: self.inserted.load(Ordering::Relaxed),
            ignored_duplicates: self.ignored_duplicates.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn repo(id: RepositoryId, name: &str) -> Repository {
        let fetched_at = Utc.timestamp_opt(1_700_000_000 + id, 0).single().unwrap_or_default();
        Repository::new(id, name, fetched_at)
    }

    fn filled(ids: &[RepositoryId]) -> RepositoryCache {
        let cache = RepositoryCache::new();
        for id in ids {
            let _ = cache.add(repo(*id, &format!("repo-{}", id)));
        }
        cache
    }

    #[test]
    fn test_add_is_idempotent_and_first_seen_wins() -> CacheResult<()> {
        let cache = RepositoryCache::new();
        assert!(cache.add(repo(1, "first"))?);
        assert!(!cache.add(repo(1, "second"))?);

        assert_eq!(cache.len()?, 1);
        let stored = cache.get(1)?.ok_or(CacheError::Empty)?;
        assert_eq!(stored.name, "first");

        let stats = cache.stats()?;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.ignored_duplicates, 1);
        Ok(())
    }

    #[test]
    fn test_get_random_on_empty_cache_reports_empty() {
        let cache = RepositoryCache::new();
        assert_eq!(cache.get_random(None), Err(CacheError::Empty));
        assert_eq!(cache.get_random(Some(&HashSet::new())), Err(CacheError::Empty));
    }

    #[test]
    fn test_get_random_respects_exclusion() -> CacheResult<()> {
        let cache = filled(&[1, 2, 3]);
        let exclude: HashSet<RepositoryId> = [1, 3].into_iter().collect();

        for _ in 0..50 {
            assert_eq!(cache.get_random(Some(&exclude))?.id, 2);
        }
        Ok(())
    }

    #[test]
    fn test_get_random_fully_excluded_reports_empty() {
        let cache = filled(&[1, 2]);
        let exclude: HashSet<RepositoryId> = [1, 2, 99].into_iter().collect();
        assert_eq!(cache.get_random(Some(&exclude)), Err(CacheError::Empty));
    }

    #[test]
    fn test_get_random_reaches_every_candidate() -> CacheResult<()> {
        let cache = filled(&[10, 11, 12, 13, 14]);
        let exclude: HashSet<RepositoryId> = [12].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(7);

        let mut seen = HashSet::new();
        for _ in 0..500 {
            seen.insert(cache.get_random_with(Some(&exclude), &mut rng)?.id);
        }
        let expected: HashSet<RepositoryId> = [10, 11, 13, 14].into_iter().collect();
        assert_eq!(seen, expected);
        assert_eq!(cache.stats()?.draws, 500);
        Ok(())
    }

    #[test]
    fn test_concurrent_adds_keep_ids_unique() -> CacheResult<()> {
        let cache = Arc::new(RepositoryCache::new());

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for id in 0..100 {
                        let _ = cache.add(repo(id, &format!("worker-{}", worker)));
                    }
                });
            }
        });

        assert_eq!(cache.len()?, 100);
        let stats = cache.stats()?;
        assert_eq!(stats.inserted, 100);
        assert_eq!(stats.ignored_duplicates, 700);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_add_is_idempotent(ids in proptest::collection::vec(0i64..50, 0..200)) {
            let cache = RepositoryCache::new();
            for id in &ids {
                let _ = cache.add(repo(*id, "first"));
            }
            let distinct: HashSet<RepositoryId> = ids.iter().copied().collect();
            prop_assert_eq!(cache.len().ok(), Some(distinct.len()));

            for id in &ids {
                prop_assert_eq!(cache.add(repo(*id, "again")).ok(), Some(false));
            }
            prop_assert_eq!(cache.len().ok(), Some(distinct.len()));
            for id in &distinct {
                let name = cache.get(*id).ok().flatten().map(|r| r.name);
                prop_assert_eq!(name.as_deref(), Some("first"));
            }
        }

        #[test]
        fn prop_get_random_never_returns_excluded(
            ids in proptest::collection::hash_set(0i64..40, 1..30),
            exclude in proptest::collection::hash_set(0i64..40, 0..30),
        ) {
            let ids: Vec<RepositoryId> = ids.into_iter().collect();
            let cache = filled(&ids);
            match cache.get_random(Some(&exclude)) {
                Ok(picked) => {
                    prop_assert!(!exclude.contains(&picked.id));
                    prop_assert!(ids.contains(&picked.id));
                }
                Err(err) => {
                    prop_assert_eq!(err, CacheError::Empty);
                    prop_assert!(ids.iter().all(|id| exclude.contains(id)));
                }
            }
        }
    }
}
