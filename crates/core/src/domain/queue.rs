// Queue Domain Model

use super::error::{DomainError, Result};
use serde::Serialize;
use std::time::Duration;

/// Queue identifier
pub type QueueId = String;

/// Default minimum interval between execution starts (1s)
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Default retry budget per work item
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Maximum queue name length
pub const MAX_QUEUE_NAME_LEN: usize = 64;

/// Per-queue configuration (one queue per upstream API)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub name: QueueId,
    /// Minimum time between the start of two consecutive executions
    pub min_interval: Duration,
    /// Retry attempts per work item on top of the first attempt
    pub max_retries: u32,
    /// Grant one extra, longer-delayed attempt once a rate-limited item has
    /// used up `max_retries`. Server errors never get this extra attempt.
    pub final_rate_limit_attempt: bool,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, min_interval: Duration, max_retries: u32) -> Self {
        Self {
            name: name.into(),
            min_interval,
            max_retries,
            final_rate_limit_attempt: true,
        }
    }

    pub fn with_final_rate_limit_attempt(mut self, enabled: bool) -> Self {
        self.final_rate_limit_attempt = enabled;
        self
    }

    /// Validate the queue name (used as a log label and config key)
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DomainError::InvalidQueueName(
                "queue name cannot be empty".to_string(),
            ));
        }

        if self.name.len() > MAX_QUEUE_NAME_LEN {
            return Err(DomainError::InvalidQueueName(format!(
                "queue name too long (max {} chars): {}",
                MAX_QUEUE_NAME_LEN, self.name
            )));
        }

        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(DomainError::InvalidQueueName(format!(
                "queue name must be alphanumeric with -, _ or .: {}",
                self.name
            )));
        }

        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new("default", DEFAULT_MIN_INTERVAL, DEFAULT_MAX_RETRIES)
    }
}

/// Read-only view of a queue for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub name: QueueId,
    pub pending: usize,
    pub is_processing: bool,
    /// Remaining rate-limit hold, if one is active
    pub rate_limited_for: Option<Duration>,
}
