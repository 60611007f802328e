// Rate-limited request queue
//
// Serializes operations against one upstream API: at most one work item runs
// at a time, consecutive starts are spaced by `min_interval`, and failures are
// retried according to the backoff policy before the submitter is settled.

pub mod constants;
mod panic_guard;
mod work_item;

use crate::application::backoff::{BackoffPolicy, RetryDecision};
use crate::domain::retry_after::MAX_RETRY_AFTER;
use crate::domain::{QueueConfig, QueueSnapshot, RequestError};
use crate::error::Result;
use panic_guard::attempt_guarded;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};
use work_item::{Submission, WorkItem};

/// FIFO serializer with minimum spacing and retry/backoff
///
/// Cheap to clone; clones share the same queue. Construct one per upstream.
#[derive(Clone)]
pub struct RateLimitedQueue {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueueConfig,
    backoff: BackoffPolicy,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Box<dyn WorkItem>>,
    last_execution_start: Option<Instant>,
    rate_limited_until: Option<Instant>,
    is_processing: bool,
}

impl RateLimitedQueue {
    /// Create a queue with the default backoff curves
    pub fn new(config: QueueConfig) -> Result<Self> {
        Self::with_backoff(config, BackoffPolicy::default())
    }

    pub fn with_backoff(config: QueueConfig, backoff: BackoffPolicy) -> Result<Self> {
        config.validate()?;

        info!(
            queue = %config.name,
            min_interval_ms = config.min_interval.as_millis() as u64,
            max_retries = config.max_retries,
            "Queue created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                backoff,
                state: Mutex::new(QueueState::default()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Submit an operation for serialized execution
    ///
    /// The item is enqueued immediately, before the returned future is
    /// polled, so submission order is call order. The operation may be
    /// called more than once (retries). Must be called within a tokio
    /// runtime, which hosts the drain loop.
    ///
    /// # Example
    /// ```text
    /// let queue = RateLimitedQueue::new(QueueConfig::new("jikan", Duration::from_secs(1), 3))?;
    /// let body = queue.submit(move || fetcher.clone().get_json(url.clone())).await?;
    /// ```
    pub fn submit<F, Fut, T>(
        &self,
        operation: F,
    ) -> impl Future<Output = std::result::Result<T, RequestError>> + Send + 'static
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, RequestError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let item: Box<dyn WorkItem> = Box::new(Submission::new(operation, tx));

        let start_drain = {
            let mut state = self.inner.state();
            state.pending.push_back(item);
            debug!(
                queue = %self.inner.config.name,
                pending = state.pending.len(),
                "Work item enqueued"
            );
            !std::mem::replace(&mut state.is_processing, true)
        };

        if start_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drain());
        }

        async move { rx.await.unwrap_or(Err(RequestError::QueueClosed)) }
    }

    /// Diagnostic view of the queue
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state();
        let now = Instant::now();

        QueueSnapshot {
            name: self.inner.config.name.clone(),
            pending: state.pending.len(),
            is_processing: state.is_processing,
            rate_limited_for: state
                .rate_limited_until
                .filter(|until| *until > now)
                .map(|until| until - now),
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        // State stays consistent across a poisoned lock: every critical
        // section is a handful of field writes
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain loop: the only place that dequeues or runs work items
    async fn drain(self: Arc<Self>) {
        debug!(queue = %self.config.name, "Drain loop started");

        loop {
            {
                let mut state = self.state();
                if state.pending.is_empty() {
                    state.is_processing = false;
                    debug!(queue = %self.config.name, "Drain loop idle");
                    return;
                }
            }

            self.wait_for_rate_limit().await;
            self.wait_for_min_interval().await;

            let item = {
                let mut state = self.state();
                let Some(item) = state.pending.pop_front() else {
                    state.is_processing = false;
                    return;
                };
                state.last_execution_start = Some(Instant::now());
                item
            };

            self.execute(item).await;
        }
    }

    /// Hold while a rate-limit window is active (re-checked after each wake)
    async fn wait_for_rate_limit(&self) {
        loop {
            let until = self.state().rate_limited_until;
            match until {
                Some(until) if Instant::now() < until => {
                    debug!(
                        queue = %self.config.name,
                        wait_ms = (until - Instant::now()).as_millis() as u64,
                        "Queue held by rate limit"
                    );
                    sleep_until(until).await;
                }
                _ => return,
            }
        }
    }

    async fn wait_for_min_interval(&self) {
        let last_start = self.state().last_execution_start;
        if let Some(last_start) = last_start {
            match last_start.checked_add(self.config.min_interval) {
                Some(ready_at) if Instant::now() < ready_at => sleep_until(ready_at).await,
                Some(_) => {}
                None => sleep(self.config.min_interval).await,
            }
        }
    }

    /// Block every queued item until `now + wait`
    fn hold(&self, wait: Duration) {
        let now = Instant::now();
        let until = now
            .checked_add(wait)
            .or_else(|| now.checked_add(MAX_RETRY_AFTER))
            .unwrap_or(now);
        self.state().rate_limited_until = Some(until);
    }

    /// Retry sub-loop for a single work item
    async fn execute(&self, mut item: Box<dyn WorkItem>) {
        let queue = self.config.name.as_str();
        let mut attempt: u32 = 0;

        loop {
            let error = match attempt_guarded(item.as_mut()).await {
                Ok(()) => {
                    debug!(queue = %queue, attempt = attempt, "Work item succeeded");
                    return;
                }
                Err(error) => error,
            };

            let class = error.classify();
            let decision = self.backoff.decide(
                attempt,
                self.config.max_retries,
                self.config.final_rate_limit_attempt,
                &class,
            );

            match decision {
                RetryDecision::Retry {
                    delay,
                    rate_limited,
                } => {
                    if rate_limited {
                        self.hold(delay);
                    }
                    warn!(
                        queue = %queue,
                        attempt = attempt,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::FinalAttempt { hold, delay } => {
                    self.hold(hold);
                    sleep(delay).await;

                    match attempt_guarded(item.as_mut()).await {
                        Ok(()) => {
                            info!(queue = %queue, "Final rate-limited attempt succeeded");
                        }
                        Err(error) => {
                            error!(
                                queue = %queue,
                                error = %error,
                                "Final rate-limited attempt failed, giving up"
                            );
                            item.reject(error);
                        }
                    }
                    return;
                }
                RetryDecision::GiveUp => {
                    warn!(
                        queue = %queue,
                        attempt = attempt,
                        error = %error,
                        "Work item failed permanently"
                    );
                    item.reject(error);
                    return;
                }
            }
        }
    }
}
