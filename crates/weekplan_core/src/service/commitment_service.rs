//! Fixed commitment and preference use-case service.
//!
//! Dated commitments may not be created for a day that already ended in the
//! reference timezone. Edits only re-check title and range. Weekly
//! commitments have no date and are always accepted once their range is
//! valid.

use crate::model::commitment::{
    CommitmentId, CommitmentValidationError, DatedCommitment, WeeklyCommitment,
};
use crate::model::preferences::SchedulePreferences;
use crate::model::task::UserId;
use crate::model::wall_time::minute_of_day;
use crate::model::weekday::Weekday;
use crate::repo::commitment_repo::{CommitmentRepository, CommitmentResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use log::info;

pub struct CommitmentService<R: CommitmentRepository> {
    repo: R,
    timezone: Tz,
}

impl<R: CommitmentRepository> CommitmentService<R> {
    pub fn new(repo: R, timezone: Tz) -> Self {
        Self { repo, timezone }
    }

    pub fn add_weekly(
        &self,
        caller: UserId,
        weekday: Weekday,
        title: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
    ) -> CommitmentResult<WeeklyCommitment> {
        let title: String = title.into();
        let commitment = WeeklyCommitment::new(caller, weekday, title.trim(), start, end);
        self.repo.add_weekly(&commitment)?;
        info!("event=commitment_add module=service status=ok scope=weekly");
        Ok(commitment)
    }

    /// Rewrites one of the caller's weekly commitments.
    pub fn update_weekly(
        &self,
        caller: UserId,
        commitment_id: CommitmentId,
        weekday: Weekday,
        title: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
    ) -> CommitmentResult<WeeklyCommitment> {
        let title: String = title.into();
        let commitment = WeeklyCommitment {
            commitment_id,
            user_id: caller,
            weekday,
            title: title.trim().to_string(),
            start,
            end,
        };
        self.repo.update_weekly(&commitment)?;
        info!("event=commitment_update module=service status=ok scope=weekly");
        Ok(commitment)
    }

    /// Adds a one-off commitment dated today or later.
    pub fn add_dated(
        &self,
        mut commitment: DatedCommitment,
        now: DateTime<Utc>,
    ) -> CommitmentResult<DatedCommitment> {
        let today = self.local_date(now);
        if commitment.date < today {
            return Err(CommitmentValidationError::DateInPast {
                date: commitment.date,
                today,
            }
            .into());
        }

        normalize_dated(&mut commitment);
        self.repo.add_dated(&commitment)?;
        info!("event=commitment_add module=service status=ok scope=dated");
        Ok(commitment)
    }

    /// Rewrites one of the caller's dated commitments. The owner is taken
    /// from `caller`, not from the draft.
    pub fn update_dated(
        &self,
        caller: UserId,
        mut commitment: DatedCommitment,
    ) -> CommitmentResult<DatedCommitment> {
        commitment.user_id = caller;
        normalize_dated(&mut commitment);
        self.repo.update_dated(&commitment)?;
        info!("event=commitment_update module=service status=ok scope=dated");
        Ok(commitment)
    }

    pub fn dated_detail(
        &self,
        caller: UserId,
        commitment_id: CommitmentId,
    ) -> CommitmentResult<DatedCommitment> {
        self.repo.dated_commitment(caller, commitment_id)
    }

    /// Dated commitments that are already over in the reference timezone.
    pub fn list_dated_history(
        &self,
        caller: UserId,
        now: DateTime<Utc>,
    ) -> CommitmentResult<Vec<DatedCommitment>> {
        let local = now.with_timezone(&self.timezone);
        self.repo
            .list_dated_history(caller, local.date_naive(), minute_of_day(local.time()))
    }

    /// Stored preferences, or empty preferences when none were saved.
    pub fn preferences(&self, caller: UserId) -> CommitmentResult<SchedulePreferences> {
        Ok(self.repo.stored_preferences(caller)?.unwrap_or_default())
    }

    pub fn update_preferences(
        &self,
        caller: UserId,
        preferences: &SchedulePreferences,
    ) -> CommitmentResult<()> {
        self.repo.save_preferences(caller, preferences)?;
        info!(
            "event=preferences_update module=service status=ok empty={}",
            preferences.is_empty()
        );
        Ok(())
    }

    pub fn list_weekly(&self, caller: UserId) -> CommitmentResult<Vec<WeeklyCommitment>> {
        self.repo.weekly_commitments(caller)
    }

    /// Dated commitments from today onward.
    pub fn list_upcoming_dated(
        &self,
        caller: UserId,
        now: DateTime<Utc>,
    ) -> CommitmentResult<Vec<DatedCommitment>> {
        self.repo.list_dated_from(caller, self.local_date(now))
    }

    pub fn delete_weekly(&self, caller: UserId, commitment_id: CommitmentId) -> CommitmentResult<()> {
        self.repo.delete_weekly(caller, commitment_id)
    }

    pub fn delete_dated(&self, caller: UserId, commitment_id: CommitmentId) -> CommitmentResult<()> {
        self.repo.delete_dated(caller, commitment_id)
    }

    /// Exposes the repository as a read port for proposer context assembly.
    pub fn provider(&self) -> &R {
        &self.repo
    }

    fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }
}

fn normalize_dated(commitment: &mut DatedCommitment) {
    commitment.title = commitment.title.trim().to_string();
    commitment.description = commitment
        .description
        .take()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
}
