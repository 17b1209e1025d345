//! SQLite helper utilities for type conversion
//!
//! SQLite has no native timestamp type; timestamps are stored as RFC 3339 TEXT.

use chrono::{SecondsFormat, Utc};

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
