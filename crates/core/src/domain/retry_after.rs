// Retry-After hint parsing
//
// Upstreams signal how long to back off in one of three shapes:
// `retry-after: 5`, `retry-after: Wed, 21 Oct 2015 07:28:00 GMT`
// or `retry-after-ms: 1500`.

use chrono::DateTime;
use std::time::Duration;

/// Header carrying the hint in seconds or as an HTTP date
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Header carrying the hint in milliseconds
pub const RETRY_AFTER_MS_HEADER: &str = "retry-after-ms";

/// Longest hint honoured (1h); larger values are clamped to this
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Parse a `retry-after` value
///
/// Accepts whole or fractional seconds, or an HTTP date which is measured
/// against `now_millis` (clamped at zero when the date already passed).
/// Results are capped at `MAX_RETRY_AFTER`. Returns `None` for anything
/// unparseable or negative.
pub fn parse_retry_after(value: &str, now_millis: i64) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER));
    }

    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Duration::try_from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64())).ok();
        }
        return None;
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta_ms = date.timestamp_millis().saturating_sub(now_millis).max(0);
    Some(Duration::from_millis(delta_ms as u64).min(MAX_RETRY_AFTER))
}

/// Parse a `retry-after-ms` value (whole milliseconds)
pub fn parse_retry_after_ms(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|ms| Duration::from_millis(ms).min(MAX_RETRY_AFTER))
}

/// Pick the hint from raw header values, preferring millisecond precision
pub fn retry_hint(
    retry_after_ms: Option<&str>,
    retry_after: Option<&str>,
    now_millis: i64,
) -> Option<Duration> {
    retry_after_ms
        .and_then(parse_retry_after_ms)
        .or_else(|| retry_after.and_then(|v| parse_retry_after(v, now_millis)))
}
