//! Serde helpers for timestamps rendered as fractional Unix seconds.
//!
//! REST callers receive times the way a file `stat` reports them, e.g.
//! `1718000000.25`.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Converts a timestamp to fractional seconds since the Unix epoch.
pub fn to_unix_seconds(at: &DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1e9
}

/// Converts fractional Unix seconds back to a timestamp.
pub fn from_unix_seconds(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos).single()
}

/// `#[serde(with = "unix_seconds")]` for `DateTime<Utc>`.
pub mod unix_seconds {
    use super::*;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(to_unix_seconds(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(d)?;
        from_unix_seconds(secs).ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// `#[serde(with = "unix_seconds_opt")]` for `Option<DateTime<Utc>>`.
pub mod unix_seconds_opt {
    use super::*;

    pub fn serialize<S: Serializer>(at: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => s.serialize_some(&to_unix_seconds(at)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<f64>::deserialize(d)? {
            Some(secs) => from_unix_seconds(secs)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("timestamp out of range")),
            None => Ok(None),
        }
    }
}
