//! Weekly schedule use-case service.
//!
//! # Responsibility
//! - Validate and annotate proposals before they reach storage.
//! - Map storage outcomes to the five caller-facing error kinds.
//! - Resolve "today" and "now" in the reference timezone.
//!
//! # Invariants
//! - Validation and authorization fail before any mutation.
//! - Upcoming results are visible, upcoming-eligible tasks of the caller's
//!   current local weekday, starting strictly after the current local minute,
//!   ascending, at most [`UPCOMING_LIMIT`].

use crate::conflict::annotator::annotate_week;
use crate::model::preferences::PreferencesError;
use crate::model::proposal::{Proposal, ProposalError};
use crate::model::task::{ScheduledTask, TaskId, UserId, WeekView};
use crate::model::wall_time::minute_of_day;
use crate::model::weekday::Weekday;
use crate::repo::commitment_repo::{CommitmentError, FixedCommitmentsProvider};
use crate::repo::schedule_repo::{
    ResolutionOutcome, ScheduleRepoError, ScheduleRepository, VisibilityOutcome,
};
use crate::service::proposer::{
    build_proposer_context, parse_proposal_response, GenerationRequest, ProposalParseError,
    ProposerFailure, ScheduleProposer,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Maximum number of tasks returned by [`ScheduleService::upcoming`].
pub const UPCOMING_LIMIT: usize = 2;

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Input that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    Proposal(ProposalError),
    Preferences(PreferencesError),
}

impl Display for InvalidInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposal(err) => write!(f, "{err}"),
            Self::Preferences(err) => write!(f, "{err}"),
        }
    }
}

/// Entity that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Task(TaskId),
    Week(UserId),
}

/// Storage layer that failed.
#[derive(Debug)]
pub enum StorageFailure {
    Schedule(ScheduleRepoError),
    Commitments(CommitmentError),
}

impl Display for StorageFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schedule(err) => write!(f, "{err}"),
            Self::Commitments(err) => write!(f, "{err}"),
        }
    }
}

/// Why generation failed upstream of validation.
#[derive(Debug)]
pub enum UpstreamFailure {
    Proposer(ProposerFailure),
    Unparseable(ProposalParseError),
}

impl Display for UpstreamFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposer(err) => write!(f, "proposer failed: {err}"),
            Self::Unparseable(err) => write!(f, "{err}"),
        }
    }
}

/// Caller-facing schedule error.
#[derive(Debug)]
pub enum ScheduleError {
    Validation(InvalidInput),
    NotFound(Missing),
    Unauthorized { task_id: TaskId, caller: UserId },
    Persistence(StorageFailure),
    UpstreamGeneration(UpstreamFailure),
}

impl ScheduleError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Persistence(_) => "persistence",
            Self::UpstreamGeneration(_) => "upstream_generation",
        }
    }
}

impl Display for ScheduleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid input: {err}"),
            Self::NotFound(Missing::Task(id)) => write!(f, "task not found: {id}"),
            Self::NotFound(Missing::Week(user)) => write!(f, "no week scheduled for user {user}"),
            Self::Unauthorized { task_id, .. } => {
                write!(f, "task {task_id} does not belong to the caller")
            }
            Self::Persistence(err) => write!(f, "storage failure: {err}"),
            Self::UpstreamGeneration(err) => write!(f, "schedule generation failed: {err}"),
        }
    }
}

impl Error for ScheduleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(InvalidInput::Proposal(err)) => Some(err),
            Self::Validation(InvalidInput::Preferences(err)) => Some(err),
            Self::Persistence(StorageFailure::Schedule(err)) => Some(err),
            Self::Persistence(StorageFailure::Commitments(err)) => Some(err),
            Self::UpstreamGeneration(UpstreamFailure::Proposer(err)) => Some(&**err),
            Self::UpstreamGeneration(UpstreamFailure::Unparseable(err)) => Some(err),
            Self::NotFound(_) | Self::Unauthorized { .. } => None,
        }
    }
}

impl From<ProposalError> for ScheduleError {
    fn from(value: ProposalError) -> Self {
        Self::Validation(InvalidInput::Proposal(value))
    }
}

impl From<PreferencesError> for ScheduleError {
    fn from(value: PreferencesError) -> Self {
        Self::Validation(InvalidInput::Preferences(value))
    }
}

impl From<ScheduleRepoError> for ScheduleError {
    fn from(value: ScheduleRepoError) -> Self {
        match value {
            ScheduleRepoError::TaskNotFound(task_id) => Self::NotFound(Missing::Task(task_id)),
            ScheduleRepoError::NotOwner { task_id, caller } => {
                Self::Unauthorized { task_id, caller }
            }
            other => Self::Persistence(StorageFailure::Schedule(other)),
        }
    }
}

impl From<CommitmentError> for ScheduleError {
    fn from(value: CommitmentError) -> Self {
        Self::Persistence(StorageFailure::Commitments(value))
    }
}

impl From<ProposalParseError> for ScheduleError {
    fn from(value: ProposalParseError) -> Self {
        Self::UpstreamGeneration(UpstreamFailure::Unparseable(value))
    }
}

/// Schedule service facade over a repository implementation.
pub struct ScheduleService<R: ScheduleRepository> {
    repo: R,
    timezone: Tz,
}

impl<R: ScheduleRepository> ScheduleService<R> {
    /// Creates a service resolving local time in `timezone`.
    pub fn new(repo: R, timezone: Tz) -> Self {
        Self { repo, timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Validates, annotates and stores `proposal` as the caller's week.
    pub fn submit_proposal(&self, caller: UserId, proposal: &Proposal) -> ScheduleResult<WeekView> {
        let started_at = Instant::now();
        let validated = match proposal.validate() {
            Ok(week) => week,
            Err(err) => {
                warn!("event=week_submit module=service status=rejected reason=validation");
                return Err(err.into());
            }
        };

        let annotated = annotate_week(&validated);
        let view = self.repo.replace_week(caller, &annotated)?;
        info!(
            "event=week_submit module=service status=ok tasks={} conflicts={} duration_ms={}",
            annotated.task_count(),
            annotated.conflict_count(),
            started_at.elapsed().as_millis()
        );
        Ok(view)
    }

    /// Full week including hidden tasks.
    pub fn week(&self, caller: UserId) -> ScheduleResult<WeekView> {
        self.repo
            .load_week(caller, true)?
            .ok_or(ScheduleError::NotFound(Missing::Week(caller)))
    }

    /// Week without hidden tasks.
    pub fn active_week(&self, caller: UserId) -> ScheduleResult<WeekView> {
        self.repo
            .load_week(caller, false)?
            .ok_or(ScheduleError::NotFound(Missing::Week(caller)))
    }

    pub fn resolve_conflict(
        &self,
        task_id: TaskId,
        caller: UserId,
    ) -> ScheduleResult<ResolutionOutcome> {
        Ok(self.repo.resolve_conflict(task_id, caller)?)
    }

    pub fn set_visibility(
        &self,
        task_id: TaskId,
        hidden: bool,
        caller: UserId,
    ) -> ScheduleResult<VisibilityOutcome> {
        Ok(self.repo.set_visibility(task_id, hidden, caller)?)
    }

    pub fn delete_task(&self, task_id: TaskId, caller: UserId) -> ScheduleResult<()> {
        Ok(self.repo.delete_task(task_id, caller)?)
    }

    /// Next tasks of today after `now`, in the reference timezone.
    pub fn upcoming(&self, caller: UserId, now: DateTime<Utc>) -> ScheduleResult<Vec<ScheduledTask>> {
        let local = now.with_timezone(&self.timezone);
        let weekday = Weekday::from_chrono(local.weekday());
        let after_minute = minute_of_day(local.time());
        Ok(self
            .repo
            .upcoming_tasks(caller, weekday, after_minute, UPCOMING_LIMIT)?)
    }

    /// Local calendar date of `now` in the reference timezone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Asks `proposer` for a week and stores it.
    ///
    /// Exactly one proposer call is made. Proposer failures and unreadable
    /// output surface as [`ScheduleError::UpstreamGeneration`]; a readable but
    /// invalid proposal surfaces as [`ScheduleError::Validation`].
    pub fn generate_week<C, P>(
        &self,
        caller: UserId,
        request: &GenerationRequest,
        commitments: &C,
        proposer: &P,
        now: DateTime<Utc>,
    ) -> ScheduleResult<WeekView>
    where
        C: FixedCommitmentsProvider + ?Sized,
        P: ScheduleProposer + ?Sized,
    {
        request.preferences.validate()?;
        let context =
            build_proposer_context(commitments, caller, request, self.local_date(now))?;

        let raw = match proposer.propose(&context) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("event=week_generate module=service status=error reason=proposer");
                return Err(ScheduleError::UpstreamGeneration(UpstreamFailure::Proposer(err)));
            }
        };
        let proposal = match parse_proposal_response(&raw) {
            Ok(proposal) => proposal,
            Err(err) => {
                warn!("event=week_generate module=service status=error reason=unparseable");
                return Err(err.into());
            }
        };

        info!(
            "event=week_generate module=service status=ok days={} weekly_commitments={} dated_commitments={}",
            proposal.days.len(),
            context.weekly_commitments.len(),
            context.dated_commitments.len()
        );
        self.submit_proposal(caller, &proposal)
    }
}
