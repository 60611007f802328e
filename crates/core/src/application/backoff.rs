// Backoff policy for the rate-limited queue
use crate::application::queue::constants::*;
use crate::domain::retry_after::MAX_RETRY_AFTER;
use crate::domain::ErrorClass;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep `delay`, then retry. `rate_limited` means the whole queue
    /// must be held back for `delay` as well.
    Retry { delay: Duration, rate_limited: bool },
    /// Retries are used up on a rate limit: hold the queue for `hold`,
    /// sleep `delay`, then make one last attempt.
    FinalAttempt { hold: Duration, delay: Duration },
    /// Do not retry, the item has failed permanently
    GiveUp,
}

/// Exponential backoff with separate curves for rate limits and 5xx errors
///
/// - rate limited: `hint` (at most 1h) or `min(2s * 2^attempt, 60s)`
/// - final rate-limited attempt: `min(wait * 2, 120s)`
/// - server error: `min(1s * 2^attempt, 10s)`
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    rate_limit_base: Duration,
    rate_limit_max: Duration,
    rate_limit_final_max: Duration,
    server_error_base: Duration,
    server_error_max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit_base: RATE_LIMIT_BASE_DELAY,
            rate_limit_max: RATE_LIMIT_MAX_DELAY,
            rate_limit_final_max: RATE_LIMIT_FINAL_MAX_DELAY,
            server_error_base: SERVER_ERROR_BASE_DELAY,
            server_error_max: SERVER_ERROR_MAX_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Decide what to do after attempt number `attempt` (0-based) failed
    ///
    /// # Arguments
    /// * `attempt` - Index of the attempt that just failed
    /// * `max_retries` - Retry budget on top of the first attempt
    /// * `final_rate_limit_attempt` - Whether an exhausted rate limit gets one more try
    /// * `class` - Classification of the failure
    ///
    /// # Example
    /// ```text
    /// match policy.decide(0, 3, true, &ErrorClass::TransientServer(503)) {
    ///     RetryDecision::Retry { delay, .. } => sleep(delay).await,
    ///     _ => unreachable!(),
    /// }
    /// ```
    pub fn decide(
        &self,
        attempt: u32,
        max_retries: u32,
        final_rate_limit_attempt: bool,
        class: &ErrorClass,
    ) -> RetryDecision {
        let retries_left = attempt < max_retries;

        match class {
            ErrorClass::RateLimited { retry_after } => {
                let wait = retry_after
                    .map(|hint| hint.min(MAX_RETRY_AFTER))
                    .unwrap_or_else(|| self.rate_limit_delay(attempt));

                if retries_left {
                    info!(
                        attempt = attempt,
                        delay_ms = wait.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    RetryDecision::Retry {
                        delay: wait,
                        rate_limited: true,
                    }
                } else if final_rate_limit_attempt {
                    let delay = self.final_delay(wait);
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limit retries exhausted, scheduling final attempt"
                    );
                    RetryDecision::FinalAttempt { hold: wait, delay }
                } else {
                    RetryDecision::GiveUp
                }
            }
            ErrorClass::TransientServer(status) if retries_left => {
                let delay = self.server_error_delay(attempt);
                info!(
                    attempt = attempt,
                    status = *status,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, scheduling retry"
                );
                RetryDecision::Retry {
                    delay,
                    rate_limited: false,
                }
            }
            _ => RetryDecision::GiveUp,
        }
    }

    /// Rate-limit backoff when no hint is available
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        exponential(self.rate_limit_base, attempt, self.rate_limit_max)
    }

    /// Wait before the final rate-limited attempt
    pub fn final_delay(&self, wait: Duration) -> Duration {
        wait.saturating_mul(2).min(self.rate_limit_final_max)
    }

    /// 5xx backoff
    pub fn server_error_delay(&self, attempt: u32) -> Duration {
        exponential(self.server_error_base, attempt, self.server_error_max)
    }
}

/// `min(base * 2^attempt, cap)`, saturating instead of overflowing
fn exponential(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}
