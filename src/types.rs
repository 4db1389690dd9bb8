use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub type BannerId = i64;

/// Wire format for timestamps: wall clock, no offset.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Serde adapter for [`TIME_FORMAT`] timestamps.
pub mod time_no_tz {
    use super::TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// One minute bucket of a stats series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickStat {
    #[serde(rename = "ts", with = "time_no_tz")]
    pub minute: NaiveDateTime,
    #[serde(rename = "v")]
    pub clicks: i64,
}

/// Body of `POST /stats/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsRequest {
    #[serde(with = "time_no_tz")]
    pub from: NaiveDateTime,
    #[serde(with = "time_no_tz")]
    pub to: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: Vec<ClickStat>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub db_ok: bool,
}
