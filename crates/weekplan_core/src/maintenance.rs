//! Weekly purge of stored schedules.
//!
//! # Responsibility
//! - Delete stored weeks in one transaction, for every user or only weeks
//!   older than a cutoff.
//! - Compute the next purge instant: Sunday 23:59 in the reference timezone.
//!
//! # Invariants
//! - Purge is global: it is not scoped to a caller.
//! - `next_purge_at(now, tz) > now` always holds.

use crate::repo::schedule_repo::{PurgeReport, ScheduleRepoResult, ScheduleRepository};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const PURGE_HOUR: u32 = 23;
const PURGE_MINUTE: u32 = 59;

/// Which weeks a purge removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PurgeScope {
    /// Every stored week of every user.
    #[default]
    AllUsers,
    /// Weeks created more than `days` days before the purge runs.
    OlderThanDays { days: u32 },
}

impl PurgeScope {
    /// Creation-time cutoff in epoch milliseconds, `None` for no cutoff.
    pub fn cutoff_ms(self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            Self::AllUsers => None,
            Self::OlderThanDays { days } => {
                Some((now - Duration::days(i64::from(days))).timestamp_millis())
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::AllUsers => "all_users",
            Self::OlderThanDays { .. } => "older_than_days",
        }
    }
}

/// Runs one purge with `scope` as of `now`.
pub fn run_weekly_purge<R>(
    repo: &R,
    scope: PurgeScope,
    now: DateTime<Utc>,
) -> ScheduleRepoResult<PurgeReport>
where
    R: ScheduleRepository + ?Sized,
{
    let started_at = Instant::now();
    let report = repo.purge_weeks(scope.cutoff_ms(now))?;
    info!(
        "event=week_purge module=maintenance status=ok scope={} weeks={} tasks={} duration_ms={}",
        scope.label(),
        report.weeks_removed,
        report.tasks_removed,
        started_at.elapsed().as_millis()
    );
    Ok(report)
}

/// Next Sunday 23:59 local time strictly after `now`.
pub fn next_purge_at(now: DateTime<Utc>, timezone: Tz) -> DateTime<Utc> {
    let local_date = now.with_timezone(&timezone).date_naive();
    let until_sunday = 6 - i64::from(local_date.weekday().num_days_from_monday());
    let purge_time = NaiveTime::from_hms_opt(PURGE_HOUR, PURGE_MINUTE, 0).unwrap_or(NaiveTime::MIN);

    let this_week = resolve_local(
        timezone,
        (local_date + Duration::days(until_sunday)).and_time(purge_time),
    );
    if this_week > now {
        return this_week;
    }
    resolve_local(
        timezone,
        (local_date + Duration::days(until_sunday + 7)).and_time(purge_time),
    )
}

fn resolve_local(timezone: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    let local = match timezone.from_local_datetime(&naive) {
        LocalResult::Single(value) => value,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Skipped by a DST jump: take the first valid instant after the gap.
        LocalResult::None => timezone
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| timezone.from_utc_datetime(&naive)),
    };
    local.with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::{next_purge_at, PurgeScope};
    use chrono::{TimeZone, Utc};

    #[test]
    fn next_purge_is_sunday_evening_in_jakarta() {
        let tz = chrono_tz::Asia::Jakarta;
        // Monday 2026-10-19 09:00 WIB.
        let now = tz
            .with_ymd_and_hms(2026, 10, 19, 9, 0, 0)
            .single()
            .expect("valid")
            .with_timezone(&Utc);
        let expected = tz
            .with_ymd_and_hms(2026, 10, 25, 23, 59, 0)
            .single()
            .expect("valid")
            .with_timezone(&Utc);
        assert_eq!(next_purge_at(now, tz), expected);
    }

    #[test]
    fn next_purge_rolls_over_after_sunday_deadline() {
        let tz = chrono_tz::Asia::Jakarta;
        let at_deadline = tz
            .with_ymd_and_hms(2026, 10, 25, 23, 59, 0)
            .single()
            .expect("valid")
            .with_timezone(&Utc);
        let expected = tz
            .with_ymd_and_hms(2026, 11, 1, 23, 59, 0)
            .single()
            .expect("valid")
            .with_timezone(&Utc);
        assert_eq!(next_purge_at(at_deadline, tz), expected);
    }

    #[test]
    fn cutoff_only_for_age_scope() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).single().expect("valid");
        assert_eq!(PurgeScope::AllUsers.cutoff_ms(now), None);
        let cutoff = PurgeScope::OlderThanDays { days: 1 }
            .cutoff_ms(now)
            .expect("cutoff");
        assert_eq!(now.timestamp_millis() - cutoff, 86_400_000);
    }
}
