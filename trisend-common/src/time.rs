//! Time constants and human formatting of remaining durations
//!
//! Shared by the server (link expiry messages) and anything rendering a
//! transfer's remaining lifetime.

use std::time::Duration;

/// Seconds per minute
pub const SECONDS_PER_MINUTE: u64 = 60;

/// Seconds per hour
pub const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;

/// Format a remaining duration for display ("9 minutes", "45 seconds")
///
/// Durations of a minute or more are shown in whole minutes, rounded up so
/// that a link with 9m01s left still reads "10 minutes".
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    if secs >= SECONDS_PER_HOUR && secs % SECONDS_PER_HOUR == 0 {
        let hours = secs / SECONDS_PER_HOUR;
        return plural(hours, "hour");
    }
    if secs >= SECONDS_PER_MINUTE {
        let minutes = secs.div_ceil(SECONDS_PER_MINUTE);
        return plural(minutes, "minute");
    }
    plural(secs, "second")
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
