//! Timestamp formatting for the on-disk store.
//!
//! All store columns hold RFC 3339 UTC strings with a trailing `Z`, matching
//! what the external sync CLI writes.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Format a timestamp for a store column.
#[must_use]
pub fn to_store(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a store timestamp leniently.
///
/// Accepts RFC 3339 with any offset and the space-separated form some SQLite
/// tooling emits. Unparseable input maps to the Unix epoch rather than
/// poisoning a whole refresh.
#[must_use]
pub fn from_store(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }
    Utc.timestamp_opt(0, 0).unwrap()
}
