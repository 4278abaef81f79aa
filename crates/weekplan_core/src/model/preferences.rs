//! Per-user scheduling preferences passed to the proposer.

use crate::model::wall_time::hhmm_opt;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A recurring daily slot such as lunch. Duration is in minutes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySlot {
    #[serde(default, with = "hhmm_opt")]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Scheduling preferences. Every field is optional; an all-empty value means
/// "no preferences".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePreferences {
    #[serde(with = "hhmm_opt")]
    pub wake_time: Option<NaiveTime>,
    #[serde(with = "hhmm_opt")]
    pub sleep_time: Option<NaiveTime>,
    pub breakfast: DailySlot,
    pub lunch: DailySlot,
    pub dinner: DailySlot,
    pub rest: DailySlot,
    #[serde(with = "hhmm_opt")]
    pub productive_start: Option<NaiveTime>,
    #[serde(with = "hhmm_opt")]
    pub productive_end: Option<NaiveTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferencesError {
    /// A duration was given for a slot without a time.
    DurationWithoutTime(&'static str),
    ProductiveWindowReversed,
}

impl Display for PreferencesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DurationWithoutTime(slot) => {
                write!(f, "{slot} time is required when a duration is set")
            }
            Self::ProductiveWindowReversed => {
                write!(f, "productive window start must be before its end")
            }
        }
    }
}

impl Error for PreferencesError {}

impl SchedulePreferences {
    /// Whether no preference has been set at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), PreferencesError> {
        for (name, slot) in [
            ("breakfast", &self.breakfast),
            ("lunch", &self.lunch),
            ("dinner", &self.dinner),
            ("rest", &self.rest),
        ] {
            let has_duration = slot.duration_minutes.is_some_and(|minutes| minutes > 0);
            if has_duration && slot.time.is_none() {
                return Err(PreferencesError::DurationWithoutTime(name));
            }
        }
        if let (Some(start), Some(end)) = (self.productive_start, self.productive_end) {
            if start >= end {
                return Err(PreferencesError::ProductiveWindowReversed);
            }
        }
        Ok(())
    }
}
