// Application Layer - Queue, backoff and concurrency control

pub mod backoff;
pub mod concurrency;
pub mod queue;

// Re-exports
pub use backoff::{BackoffPolicy, RetryDecision};
pub use concurrency::ConcurrencyLimiter;
pub use queue::RateLimitedQueue;
