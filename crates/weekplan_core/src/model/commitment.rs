//! Fixed commitment models consumed as proposer context.
//!
//! Commitments never take part in conflict detection; they only describe
//! time the proposer must plan around.

use crate::model::task::UserId;
use crate::model::wall_time::hhmm;
use crate::model::weekday::Weekday;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a commitment row.
pub type CommitmentId = Uuid;

/// Validation failures for commitment writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitmentValidationError {
    BlankTitle,
    InvalidRange { start: NaiveTime, end: NaiveTime },
    DateInPast { date: NaiveDate, today: NaiveDate },
}

impl Display for CommitmentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "commitment title must not be blank"),
            Self::InvalidRange { start, end } => write!(
                f,
                "commitment start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            Self::DateInPast { date, today } => {
                write!(f, "commitment date {date} is before today ({today})")
            }
        }
    }
}

impl Error for CommitmentValidationError {}

/// Recurring commitment, e.g. a lecture every Tuesday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCommitment {
    pub commitment_id: CommitmentId,
    pub user_id: UserId,
    pub weekday: Weekday,
    pub title: String,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl WeeklyCommitment {
    /// Creates a commitment with a generated id.
    pub fn new(
        user_id: UserId,
        weekday: Weekday,
        title: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Self {
        Self {
            commitment_id: Uuid::new_v4(),
            user_id,
            weekday,
            title: title.into(),
            start,
            end,
        }
    }

    pub fn validate(&self) -> Result<(), CommitmentValidationError> {
        validate_title_and_range(&self.title, self.start, self.end)
    }
}

/// One-off commitment on a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedCommitment {
    pub commitment_id: CommitmentId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl DatedCommitment {
    /// Creates a commitment with a generated id and no description.
    pub fn new(
        user_id: UserId,
        date: NaiveDate,
        title: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Self {
        Self {
            commitment_id: Uuid::new_v4(),
            user_id,
            date,
            title: title.into(),
            description: None,
            start,
            end,
        }
    }

    pub fn validate(&self) -> Result<(), CommitmentValidationError> {
        validate_title_and_range(&self.title, self.start, self.end)
    }

    /// Canonical weekday of the commitment date.
    pub fn weekday(&self) -> Weekday {
        use chrono::Datelike;
        Weekday::from_chrono(self.date.weekday())
    }
}

fn validate_title_and_range(
    title: &str,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<(), CommitmentValidationError> {
    if title.trim().is_empty() {
        return Err(CommitmentValidationError::BlankTitle);
    }
    if start >= end {
        return Err(CommitmentValidationError::InvalidRange { start, end });
    }
    Ok(())
}
