//! Proposal input model and validation.
//!
//! # Responsibility
//! - Describe the untrusted weekly proposal produced by an external proposer.
//! - Turn it into a `ValidatedWeek` or fail on the first violation.
//!
//! # Invariants
//! - A `ValidatedWeek` can only be built through [`Proposal::validate`].
//! - Every validated task has `start < end` and a proposer kind.
//! - A weekday appears at most once per validated week.

use crate::model::task::ProposedKind;
use crate::model::wall_time::parse_hhmm;
use crate::model::weekday::Weekday;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Raw proposal: ordered per-day task lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proposal {
    pub days: Vec<ProposedDay>,
}

/// Raw day entry of a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedDay {
    pub day: String,
    #[serde(default)]
    pub tasks: Vec<ProposedTask>,
}

/// Raw task entry of a proposal. Every field is still untrusted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedTask {
    pub description: String,
    pub start: String,
    pub end: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// First violation found while validating a proposal.
///
/// `day_index` and `task_index` are zero-based positions in the proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    UnknownDay {
        day_index: usize,
        label: String,
    },
    DuplicateDay {
        day_index: usize,
        weekday: Weekday,
    },
    EmptyDescription {
        day_index: usize,
        task_index: usize,
    },
    InvalidTime {
        day_index: usize,
        task_index: usize,
        value: String,
    },
    InvalidRange {
        day_index: usize,
        task_index: usize,
        start: String,
        end: String,
    },
    UnknownKind {
        day_index: usize,
        task_index: usize,
        value: String,
    },
    MissingSuggestion {
        day_index: usize,
        task_index: usize,
    },
}

impl Display for ProposalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDay { day_index, label } => {
                write!(f, "day #{day_index}: `{label}` is not a canonical weekday")
            }
            Self::DuplicateDay { day_index, weekday } => {
                write!(f, "day #{day_index}: {weekday} appears more than once")
            }
            Self::EmptyDescription {
                day_index,
                task_index,
            } => write!(f, "day #{day_index} task #{task_index}: description is blank"),
            Self::InvalidTime {
                day_index,
                task_index,
                value,
            } => write!(
                f,
                "day #{day_index} task #{task_index}: `{value}` is not a HH:MM time"
            ),
            Self::InvalidRange {
                day_index,
                task_index,
                start,
                end,
            } => write!(
                f,
                "day #{day_index} task #{task_index}: start {start} must be before end {end}"
            ),
            Self::UnknownKind {
                day_index,
                task_index,
                value,
            } => write!(
                f,
                "day #{day_index} task #{task_index}: unknown kind `{value}`; expected fixed|basic|free|background"
            ),
            Self::MissingSuggestion {
                day_index,
                task_index,
            } => write!(
                f,
                "day #{day_index} task #{task_index}: free tasks require a suggestion"
            ),
        }
    }
}

impl Error for ProposalError {}

/// Proposal that passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedWeek {
    days: Vec<ValidatedDay>,
}

/// Validated day with tasks in proposal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDay {
    pub weekday: Weekday,
    pub tasks: Vec<ValidatedTask>,
}

/// Validated task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTask {
    pub description: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub kind: ProposedKind,
    pub suggestion: Option<String>,
}

impl ValidatedWeek {
    /// Days in proposal order.
    pub fn days(&self) -> &[ValidatedDay] {
        &self.days
    }

    /// Total task count across all days.
    pub fn task_count(&self) -> usize {
        self.days.iter().map(|day| day.tasks.len()).sum()
    }
}

impl Proposal {
    /// Validates the whole proposal, stopping at the first violation.
    pub fn validate(&self) -> Result<ValidatedWeek, ProposalError> {
        let mut seen = HashSet::new();
        let mut days = Vec::with_capacity(self.days.len());

        for (day_index, day) in self.days.iter().enumerate() {
            let weekday =
                Weekday::parse_label(&day.day).ok_or_else(|| ProposalError::UnknownDay {
                    day_index,
                    label: day.day.clone(),
                })?;
            if !seen.insert(weekday) {
                return Err(ProposalError::DuplicateDay { day_index, weekday });
            }

            let tasks = day
                .tasks
                .iter()
                .enumerate()
                .map(|(task_index, task)| validate_task(day_index, task_index, task))
                .collect::<Result<Vec<_>, _>>()?;
            days.push(ValidatedDay { weekday, tasks });
        }

        Ok(ValidatedWeek { days })
    }
}

fn validate_task(
    day_index: usize,
    task_index: usize,
    task: &ProposedTask,
) -> Result<ValidatedTask, ProposalError> {
    let description = task.description.trim();
    if description.is_empty() {
        return Err(ProposalError::EmptyDescription {
            day_index,
            task_index,
        });
    }

    let parse_time = |value: &str| {
        parse_hhmm(value).ok_or_else(|| ProposalError::InvalidTime {
            day_index,
            task_index,
            value: value.to_string(),
        })
    };
    let start = parse_time(&task.start)?;
    let end = parse_time(&task.end)?;
    if start >= end {
        return Err(ProposalError::InvalidRange {
            day_index,
            task_index,
            start: task.start.clone(),
            end: task.end.clone(),
        });
    }

    let kind = ProposedKind::parse(&task.kind).ok_or_else(|| ProposalError::UnknownKind {
        day_index,
        task_index,
        value: task.kind.clone(),
    })?;

    let suggestion = task
        .suggestion
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    if kind == ProposedKind::Free && suggestion.is_none() {
        return Err(ProposalError::MissingSuggestion {
            day_index,
            task_index,
        });
    }

    Ok(ValidatedTask {
        description: description.to_string(),
        start,
        end,
        kind,
        suggestion,
    })
}
