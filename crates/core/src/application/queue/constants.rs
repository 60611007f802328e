// Queue backoff constants (no magic values)
use std::time::Duration;

/// Base delay for rate-limit backoff without a Retry-After hint (2s)
pub const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Cap on rate-limit backoff (60s)
pub const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_millis(60_000);

/// Cap on the extra wait before the final rate-limited attempt (120s)
pub const RATE_LIMIT_FINAL_MAX_DELAY: Duration = Duration::from_millis(120_000);

/// Base delay for 5xx backoff (1s)
pub const SERVER_ERROR_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Cap on 5xx backoff (10s)
pub const SERVER_ERROR_MAX_DELAY: Duration = Duration::from_millis(10_000);
