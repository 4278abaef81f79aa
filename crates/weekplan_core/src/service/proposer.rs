//! Proposer port, context assembly and response parsing.
//!
//! # Responsibility
//! - Define the [`ScheduleProposer`] trait implemented by callers.
//! - Assemble the [`ProposerContext`] from profile, intent, preferences and
//!   stored fixed commitments.
//! - Turn raw proposer text into a typed [`Proposal`].
//!
//! # Invariants
//! - Dated commitments in the context cover today through Sunday of the
//!   current week, both inclusive.
//! - Preferences sent with the request win over stored preferences; stored
//!   ones are used when the request carries none.
//! - Parsing never guesses at task fields; only the surrounding envelope
//!   (markdown fence, `schedule` wrapper) is tolerated.

use crate::model::commitment::{DatedCommitment, WeeklyCommitment};
use crate::model::preferences::SchedulePreferences;
use crate::model::proposal::Proposal;
use crate::model::task::UserId;
use crate::repo::commitment_repo::{CommitmentResult, FixedCommitmentsProvider};
use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

static FENCED_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid fence regex")
});

/// Failure reported by a proposer implementation.
pub type ProposerFailure = Box<dyn Error + Send + Sync + 'static>;

/// External schedule generator. Called exactly once per generation request.
pub trait ScheduleProposer {
    /// Returns raw text expected to hold a weekly proposal as JSON.
    fn propose(&self, context: &ProposerContext) -> Result<String, ProposerFailure>;
}

impl<F> ScheduleProposer for F
where
    F: Fn(&ProposerContext) -> Result<String, ProposerFailure>,
{
    fn propose(&self, context: &ProposerContext) -> Result<String, ProposerFailure> {
        self(context)
    }
}

/// Free-form self description supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: Option<String>,
    pub hobby: Option<String>,
    pub daily_routine: Option<String>,
    pub other_details: Option<String>,
}

/// Caller input for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub profile: Option<UserProfile>,
    /// What the user wants scheduled this week.
    pub intent: String,
    pub additional_details: Option<String>,
    pub preferences: SchedulePreferences,
}

/// Everything a proposer sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposerContext {
    pub today: NaiveDate,
    pub week_end: NaiveDate,
    pub profile: Option<UserProfile>,
    pub intent: String,
    pub additional_details: Option<String>,
    pub weekly_commitments: Vec<WeeklyCommitment>,
    pub dated_commitments: Vec<DatedCommitment>,
    pub preferences: SchedulePreferences,
}

/// Last day (Sunday) of the Monday-first week containing `day`.
pub fn end_of_week(day: NaiveDate) -> NaiveDate {
    let remaining = 6 - i64::from(day.weekday().num_days_from_monday());
    day + Duration::days(remaining)
}

/// Builds the proposer context for `user_id` as of local date `today`.
pub fn build_proposer_context<P>(
    provider: &P,
    user_id: UserId,
    request: &GenerationRequest,
    today: NaiveDate,
) -> CommitmentResult<ProposerContext>
where
    P: FixedCommitmentsProvider + ?Sized,
{
    let week_end = end_of_week(today);
    let preferences = if request.preferences.is_empty() {
        provider.stored_preferences(user_id)?.unwrap_or_default()
    } else {
        request.preferences.clone()
    };
    Ok(ProposerContext {
        today,
        week_end,
        profile: request.profile.clone(),
        intent: request.intent.trim().to_string(),
        additional_details: request
            .additional_details
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string),
        weekly_commitments: provider.weekly_commitments(user_id)?,
        dated_commitments: provider.dated_commitments_between(user_id, today, week_end)?,
        preferences,
    })
}

/// Why proposer output could not be read as a proposal.
#[derive(Debug)]
pub enum ProposalParseError {
    /// Output was empty or whitespace.
    Empty,
    /// Output is not JSON, even after fence stripping.
    NotJson(serde_json::Error),
    /// JSON parsed, but the envelope is neither an array nor `{schedule: [...]}`.
    UnexpectedShape,
    /// Envelope was fine, the day/task entries are malformed.
    InvalidEntries(serde_json::Error),
}

impl Display for ProposalParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "proposer returned empty output"),
            Self::NotJson(err) => write!(f, "proposer output is not JSON: {err}"),
            Self::UnexpectedShape => write!(
                f,
                "proposer output must be an array of days or an object with a `schedule` array"
            ),
            Self::InvalidEntries(err) => write!(f, "proposer output has malformed entries: {err}"),
        }
    }
}

impl Error for ProposalParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotJson(err) | Self::InvalidEntries(err) => Some(err),
            Self::Empty | Self::UnexpectedShape => None,
        }
    }
}

/// Parses raw proposer output.
///
/// Accepted envelopes: plain JSON, JSON inside a markdown code fence, a
/// top-level array of days, or an object with a `schedule` array.
pub fn parse_proposal_response(raw: &str) -> Result<Proposal, ProposalParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProposalParseError::Empty);
    }

    let body = FENCED_BLOCK_RE
        .captures(trimmed)
        .and_then(|captures| captures.get(1))
        .map(|inner| inner.as_str().trim())
        .unwrap_or(trimmed);

    let value: Value = serde_json::from_str(body).map_err(ProposalParseError::NotJson)?;
    let days = match value {
        Value::Array(_) => value,
        Value::Object(mut object) => match object.remove("schedule") {
            Some(days @ Value::Array(_)) => days,
            _ => return Err(ProposalParseError::UnexpectedShape),
        },
        _ => return Err(ProposalParseError::UnexpectedShape),
    };

    serde_json::from_value(days).map_err(ProposalParseError::InvalidEntries)
}

#[cfg(test)]
mod tests {
    use super::{end_of_week, parse_proposal_response, ProposalParseError};
    use chrono::NaiveDate;

    const DAY_JSON: &str = r#"[{"day":"Monday","tasks":[{"description":"Gym","start":"07:00","end":"08:00","kind":"basic"}]}]"#;

    #[test]
    fn accepts_plain_array() {
        let proposal = parse_proposal_response(DAY_JSON).expect("plain array");
        assert_eq!(proposal.days.len(), 1);
        assert_eq!(proposal.days[0].tasks[0].description, "Gym");
    }

    #[test]
    fn accepts_fenced_json_with_prose() {
        let raw = format!("Here is your week:\n```json\n{DAY_JSON}\n```\nEnjoy!");
        let proposal = parse_proposal_response(&raw).expect("fenced");
        assert_eq!(proposal.days[0].day, "Monday");
    }

    #[test]
    fn accepts_schedule_wrapper() {
        let raw = format!(r#"{{"schedule": {DAY_JSON}}}"#);
        let proposal = parse_proposal_response(&raw).expect("wrapped");
        assert_eq!(proposal.days.len(), 1);
    }

    #[test]
    fn rejects_non_json_and_wrong_shapes() {
        assert!(matches!(
            parse_proposal_response("Sorry, I cannot help with that."),
            Err(ProposalParseError::NotJson(_))
        ));
        assert!(matches!(
            parse_proposal_response(r#"{"days": []}"#),
            Err(ProposalParseError::UnexpectedShape)
        ));
        assert!(matches!(
            parse_proposal_response("   "),
            Err(ProposalParseError::Empty)
        ));
        assert!(matches!(
            parse_proposal_response(r#"[{"tasks": []}]"#),
            Err(ProposalParseError::InvalidEntries(_))
        ));
    }

    #[test]
    fn week_ends_on_sunday() {
        let wednesday = NaiveDate::from_ymd_opt(2026, 10, 14).expect("date");
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
        assert_eq!(end_of_week(wednesday), sunday);
        assert_eq!(end_of_week(sunday), sunday);
    }
}
