//! Timestamp helpers shared by the store and the engine.
//!
//! Timestamps are persisted as RFC 3339 text in UTC with a fixed microsecond
//! precision. With a fixed width the lexical order of the stored text equals
//! the chronological order, so range filters can run as plain string
//! comparisons inside SQLite.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Lower bound used when a record carries no usable timestamp.
#[must_use]
pub fn min_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

/// Upper bound used when a record carries no usable timestamp.
#[must_use]
pub fn max_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::MAX_UTC
}

/// Formats a timestamp for storage.
#[must_use]
pub fn to_db_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp.
pub fn from_db_string(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp(format!("{s}: {e}")))
}

/// Parses an optional stored timestamp.
pub fn from_db_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(from_db_string).transpose()
}

/// Builds a UTC timestamp from calendar components.
///
/// Returns `None` for components that do not form a valid date/time.
#[must_use]
pub fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec).single()
}
