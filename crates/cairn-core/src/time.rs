//! Millisecond epoch clock.
//!
//! Every persisted timestamp in Cairn is an `i64` count of milliseconds since
//! the Unix epoch. Merge decisions compare these values directly.

use chrono::{TimeZone, Utc};

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Return a timestamp that is `>= previous` and as close to now as possible.
///
/// Used when bumping `updatedAt` so a clock that steps backwards never makes
/// a session look older than it was.
pub fn monotonic_after(previous: i64) -> i64 {
    now_ms().max(previous)
}

/// Format a millisecond timestamp as `YYYY-MM-DD HH:MM` (UTC).
///
/// Out-of-range values format as an empty string.
pub fn format_minute(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
