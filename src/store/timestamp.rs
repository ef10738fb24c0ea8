//! Timestamp formats for values written to and read back from the store.
//!
//! The database has held timestamps in more than one shape over its
//! lifetime (driver-formatted offsets, SQLite's `CURRENT_TIMESTAMP`
//! default, trailing-Z UTC), so read-back tries an ordered list of parse
//! strategies rather than assuming a single format:
//!
//! 1. RFC 3339
//! 2. `%Y-%m-%d %H:%M:%S%:z` (SQL-style with offset)
//! 3. `%Y-%m-%dT%H:%M:%SZ` (trailing-Z UTC)
//! 4. `%Y-%m-%d %H:%M:%S` (bare `CURRENT_TIMESTAMP`, assumed UTC)
//!
//! A value matching none of these degrades to the Unix epoch rather than
//! failing the whole query. That is a latent data-quality risk callers
//! must tolerate: a row with an epoch timestamp sorts last, it does not
//! disappear.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use tracing::warn;

/// Formats a timestamp for storage: UTC, second precision, trailing `Z`.
///
/// Every value this crate writes uses this single shape, so `received_at`
/// range predicates compare correctly as text.
pub fn format_stored(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Formats with offset, then naive (assumed UTC), tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"];

/// Parses a timestamp read back from the database.
///
/// Falls back to the Unix epoch (with a warning) when no strategy
/// matches. See the module docs for the strategy order.
pub fn parse_stored(s: &str) -> DateTime<Utc> {
    match try_parse_stored(s) {
        Some(dt) => dt,
        None => {
            warn!(value = %s, "stored timestamp matches no known format, degrading to epoch");
            DateTime::UNIX_EPOCH
        }
    }
}

fn try_parse_stored(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Parses the `receivedAt` value claimed by the gateway in a webhook
/// payload: RFC 3339, then the gateway's millisecond-with-offset form.
///
/// Returns `None` when neither matches; ingestion substitutes the
/// current time rather than dropping the delivery.
pub fn parse_claimed(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.3f%:z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
