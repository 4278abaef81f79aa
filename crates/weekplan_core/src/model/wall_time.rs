//! Wall-clock `HH:MM` helpers shared by proposals, storage and views.
//!
//! Times are same-day only: `00:00` through `23:59`. Storage keeps them as
//! minutes since midnight.

use chrono::{NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

static HHMM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").expect("static HH:MM pattern is valid")
});

/// Parses `H:MM` or `HH:MM` (24h clock). Seconds are not accepted.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let captures = HHMM_PATTERN.captures(value.trim())?;
    let hour = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let minute = captures.get(2)?.as_str().parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Formats a time as zero-padded `HH:MM`.
pub fn format_hhmm(value: NaiveTime) -> String {
    value.format("%H:%M").to_string()
}

/// Minutes elapsed since midnight, truncating seconds.
pub fn minute_of_day(value: NaiveTime) -> i64 {
    i64::from(value.hour() * 60 + value.minute())
}

/// Inverse of [`minute_of_day`]; `None` outside `0..1440`.
pub fn from_minute_of_day(value: i64) -> Option<NaiveTime> {
    if !(0..24 * 60).contains(&value) {
        return None;
    }
    let value = u32::try_from(value).ok()?;
    NaiveTime::from_hms_opt(value / 60, value % 60, 0)
}

/// Serde adapter writing `NaiveTime` as `HH:MM`.
pub mod hhmm {
    use super::{format_hhmm, parse_hhmm};
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hhmm(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_hhmm(&raw).ok_or_else(|| D::Error::custom(format!("invalid HH:MM time `{raw}`")))
    }
}

/// Serde adapter writing `Option<NaiveTime>` as `HH:MM` or `null`.
pub mod hhmm_opt {
    use super::{format_hhmm, parse_hhmm};
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&format_hhmm(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_hhmm(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid HH:MM time `{raw}`"))),
        }
    }
}
