use chrono::{DateTime, SecondsFormat, Utc};

/// Wall-clock instant used for log lines, turns and metric receipts.
pub type Timestamp = DateTime<Utc>;

pub fn now() -> Timestamp {
    Utc::now()
}

/// RFC 3339, UTC, millisecond precision: `2025-01-01T12:00:00.000Z`.
pub fn format_timestamp(at: &Timestamp) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Timeline key. Events whose receipt falls in the same millisecond share a point.
pub fn time_key(at: &Timestamp) -> i64 {
    at.timestamp_millis()
}

pub fn from_time_key(key: i64) -> Option<Timestamp> {
    DateTime::<Utc>::from_timestamp_millis(key)
}
