use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the unix epoch.
///
/// A clock before 1970 reads as 0 rather than failing; lease expiry and
/// record ages only ever compare values produced by this function.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Age of a timestamp produced by [`now_ms`], saturating at zero for
/// timestamps in the future (clock skew between instances).
pub fn age_since_ms(timestamp_ms: i64) -> Duration {
    Duration::from_millis(now_ms().saturating_sub(timestamp_ms).max(0) as u64)
}
