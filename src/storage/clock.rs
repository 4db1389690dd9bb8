use chrono::{DateTime, NaiveDateTime, Utc};

pub const MINUTE_MS: i64 = 60_000;

/// Source of "now" for the store. Timestamps are naive wall-clock values.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Milliseconds since the epoch of a naive timestamp, as persisted.
pub fn to_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Start of the minute containing `ms`. Floors, so pre-epoch values round down too.
pub fn minute_bucket_millis(ms: i64) -> i64 {
    ms.div_euclid(MINUTE_MS) * MINUTE_MS
}
