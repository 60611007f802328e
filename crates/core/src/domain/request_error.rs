// Upstream request failures and their classification

use std::time::Duration;
use thiserror::Error;

/// Error codes that upstream clients use to signal rate limiting
const RATE_LIMIT_CODES: &[&str] = &["RATE_LIMITED", "ERR_RATE_LIMIT", "429"];

/// Message fragments (lowercase) that signal rate limiting
const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "ratelimit", "too many requests"];

/// Failure of a single upstream operation submitted to a queue
#[derive(Error, Debug)]
pub enum RequestError {
    /// Upstream answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Parsed `Retry-After` style hint, if the upstream sent one
        retry_after: Option<Duration>,
    },

    /// Connect, timeout or socket failure before a response arrived
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        code: Option<String>,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    /// The operation panicked; caught at the attempt boundary
    #[error("Operation panicked: {0}")]
    Panicked(String),

    /// The queue was torn down before the work item settled
    #[error("Queue closed before the request settled")]
    QueueClosed,

    #[error("{0}")]
    Other(String),
}

/// Closed set of retry classes, computed once per failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Upstream asked us to slow down (429 or equivalent)
    RateLimited { retry_after: Option<Duration> },
    /// 5xx from upstream, worth a short backoff
    TransientServer(u16),
    /// Everything else: surfaced to the caller without special backoff
    Permanent,
}

impl RequestError {
    /// Build a status error without a retry hint
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        RequestError::Status {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        RequestError::Transport {
            message: message.into(),
            code: None,
        }
    }

    /// Attach a retry hint (no-op for variants that cannot carry one)
    pub fn with_retry_after(self, hint: Duration) -> Self {
        match self {
            RequestError::Status {
                status, message, ..
            } => RequestError::Status {
                status,
                message,
                retry_after: Some(hint),
            },
            other => other,
        }
    }

    /// Attach a machine-readable code (no-op for variants that cannot carry one)
    pub fn with_code(self, code: impl Into<String>) -> Self {
        match self {
            RequestError::Transport { message, .. } => RequestError::Transport {
                message,
                code: Some(code.into()),
            },
            other => other,
        }
    }

    /// HTTP status, when the upstream answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify this failure for the retry loop
    ///
    /// Order matters: rate limiting is checked before server errors, so a
    /// 503 whose body says "rate limit exceeded" is treated as rate limited.
    pub fn classify(&self) -> ErrorClass {
        if self.is_rate_limited() {
            let retry_after = match self {
                RequestError::Status { retry_after, .. } => *retry_after,
                _ => None,
            };
            return ErrorClass::RateLimited { retry_after };
        }

        match self.status_code() {
            Some(status) if (500..=599).contains(&status) => ErrorClass::TransientServer(status),
            _ => ErrorClass::Permanent,
        }
    }

    fn is_rate_limited(&self) -> bool {
        if self.status_code() == Some(429) {
            return true;
        }

        if let RequestError::Transport {
            code: Some(code), ..
        } = self
        {
            if RATE_LIMIT_CODES
                .iter()
                .any(|known| code.eq_ignore_ascii_case(known))
            {
                return true;
            }
        }

        // Decode and panic text is not an upstream signal
        let message = match self {
            RequestError::Status { message, .. }
            | RequestError::Transport { message, .. }
            | RequestError::Other(message) => message.to_lowercase(),
            _ => return false,
        };
        RATE_LIMIT_PHRASES
            .iter()
            .any(|phrase| message.contains(phrase))
    }
}
