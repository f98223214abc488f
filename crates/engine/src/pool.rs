//! Concurrency token pool (`-j N`).
//!
//! One pool belongs to one request. Nested requests get their own pool so a
//! child never waits on tokens its parent is holding.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::EngineError;

#[derive(Debug, Clone)]
pub struct TokenPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot. Dropping it returns the slot to the pool.
#[derive(Debug)]
pub struct Token {
    _permit: OwnedSemaphorePermit,
}

impl TokenPool {
    /// # Errors
    /// [`EngineError::InvalidJobs`] for zero, or more slots than the
    /// semaphore can represent.
    pub fn new(jobs: usize) -> Result<Self, EngineError> {
        if jobs == 0 || jobs > Semaphore::MAX_PERMITS {
            return Err(EngineError::InvalidJobs(jobs));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(jobs)),
            capacity: jobs,
        })
    }

    /// The `N` this pool was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Token {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("token pool semaphore is never closed");
        Token { _permit: permit }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<Token> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| Token { _permit: permit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_jobs_is_invalid() {
        assert!(matches!(TokenPool::new(0), Err(EngineError::InvalidJobs(0))));
    }

    #[test]
    fn tokens_are_bounded_and_returned_on_drop() {
        let pool = TokenPool::new(2).unwrap();
        let a = pool.try_acquire().expect("first slot");
        let _b = pool.try_acquire().expect("second slot");
        assert!(pool.try_acquire().is_none());

        drop(a);
        assert!(pool.try_acquire().is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_a_release() {
        let pool = TokenPool::new(1).unwrap();
        let held = pool.acquire().await;

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { drop(pool.acquire().await) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
        assert!(pool.try_acquire().is_some());
    }
}
