//! Process-wide permit pool bounding simultaneous upstream calls.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// A held permit. Dropping it returns the slot to the pool.
pub type Permit = OwnedSemaphorePermit;

/// Fixed-capacity concurrency limiter shared by every request.
///
/// Construct one per process and hand clones to whoever needs it; clones
/// share the same underlying semaphore.
#[derive(Debug, Clone)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl PermitPool {
    /// Create a pool with `capacity` permits. Zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit, or give up once `cancel` fires.
    ///
    /// Cancellation wins when both are ready at the same time.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<Permit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_is_raised() {
        let pool = PermitPool::new(0);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_permits() {
        let pool = PermitPool::new(2);
        let other = pool.clone();
        let cancel = CancellationToken::new();

        let first = pool.acquire(&cancel).await;
        let second = other.acquire(&cancel).await;
        assert!(first.is_some() && second.is_some());
        assert_eq!(pool.available(), 0);

        drop(first);
        assert_eq!(other.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_gives_up_on_cancel() {
        let pool = PermitPool::new(1);
        let cancel = CancellationToken::new();
        let _held = pool.acquire(&cancel).await;

        let waiter = {
            let pool = pool.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pool.acquire(&cancel).await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(waiter.await.ok(), Some(false));
    }

    #[tokio::test]
    async fn test_cancel_preferred_over_free_permit() {
        let pool = PermitPool::new(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(pool.acquire(&cancel).await.is_none());
        assert_eq!(pool.available(), 1);
    }
}
