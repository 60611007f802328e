//! Concurrency Limiter
//!
//! Bounds how many outbound requests run at once (e.g. image downloads).
//! Unlike the rate-limited queue this does not order or space requests,
//! it only caps parallelism.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Semaphore-backed limiter; clones share the same permits
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter allowing `limit` futures in flight (0 is treated as 1)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Run `future` once a slot is free
    pub async fn run<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        // The semaphore is never closed, so acquire only fails if that changes
        let _permit = self.semaphore.acquire().await.ok();
        future.await
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of futures currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }
}
