//! Epoch-millisecond timestamp helpers.
//!
//! Timestamp properties are stored as milliseconds since the Unix epoch.
//! Textual input is accepted in ISO-like shapes; an explicit `Z` or `±HH:MM`
//! suffix fixes the offset, otherwise the local offset of the running
//! process applies.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::time::{SystemTime, UNIX_EPOCH};

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Current time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Parses an ISO-like date/time string into epoch milliseconds.
///
/// Returns `None` when the string matches none of the accepted shapes.
#[must_use]
pub fn parse_timestamp_millis(input: &str) -> Option<i64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }

    // A trailing `Z` is the zero offset in every shape we accept.
    let normalized = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(rest) => format!("{rest}+00:00"),
        None => s.to_string(),
    };

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.timestamp_millis());
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return local_millis(naive);
        }
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    local_millis(date.and_hms_opt(0, 0, 0)?)
}

fn local_millis(naive: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}
