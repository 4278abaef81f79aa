//! Fixed commitment and scheduling preference storage.
//!
//! # Responsibility
//! - Persist recurring weekly and dated one-off commitments per user.
//! - Persist one set of scheduling preferences per user.
//! - Serve both to proposer context assembly through
//!   [`FixedCommitmentsProvider`].
//!
//! # Invariants
//! - Writes call `validate()` before persistence.
//! - Updates and deletes are scoped to the owner; a foreign or unknown id is
//!   `NotFound`.
//! - Upcoming dated listings are ordered by `date ASC, start_minute ASC`;
//!   history is ordered by `date ASC, start_minute DESC`.
//! - Weekly listings are ordered by canonical weekday, then start.

use crate::db::migrations::latest_version;
use crate::db::schema::table_exists;
use crate::db::DbError;
use crate::model::commitment::{
    CommitmentId, CommitmentValidationError, DatedCommitment, WeeklyCommitment,
};
use crate::model::preferences::{PreferencesError, SchedulePreferences};
use crate::model::task::UserId;
use crate::model::wall_time::{from_minute_of_day, minute_of_day};
use crate::model::weekday::Weekday;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATED_COLUMNS: &str =
    "commitment_uuid, user_id, date, title, description, start_minute, end_minute";

pub type CommitmentResult<T> = Result<T, CommitmentError>;

/// Errors from commitment storage and use-cases.
#[derive(Debug)]
pub enum CommitmentError {
    Db(DbError),
    Validation(CommitmentValidationError),
    InvalidPreferences(PreferencesError),
    /// Commitment does not exist for the caller.
    NotFound(CommitmentId),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for CommitmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidPreferences(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "commitment not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "commitment repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "commitment repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid commitment data: {message}"),
        }
    }
}

impl Error for CommitmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::InvalidPreferences(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for CommitmentError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CommitmentError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<CommitmentValidationError> for CommitmentError {
    fn from(value: CommitmentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<PreferencesError> for CommitmentError {
    fn from(value: PreferencesError) -> Self {
        Self::InvalidPreferences(value)
    }
}

/// Read port used when assembling proposer context.
pub trait FixedCommitmentsProvider {
    fn weekly_commitments(&self, user_id: UserId) -> CommitmentResult<Vec<WeeklyCommitment>>;
    /// Dated commitments with `from <= date <= to`.
    fn dated_commitments_between(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CommitmentResult<Vec<DatedCommitment>>;
    /// Preferences saved by the user, `None` when never saved.
    fn stored_preferences(&self, user_id: UserId) -> CommitmentResult<Option<SchedulePreferences>>;
}

/// Write side of commitment storage.
pub trait CommitmentRepository: FixedCommitmentsProvider {
    fn add_weekly(&self, commitment: &WeeklyCommitment) -> CommitmentResult<CommitmentId>;
    fn add_dated(&self, commitment: &DatedCommitment) -> CommitmentResult<CommitmentId>;
    /// Overwrites the row with the same id owned by `commitment.user_id`.
    fn update_weekly(&self, commitment: &WeeklyCommitment) -> CommitmentResult<()>;
    /// Overwrites the row with the same id owned by `commitment.user_id`.
    fn update_dated(&self, commitment: &DatedCommitment) -> CommitmentResult<()>;
    fn dated_commitment(
        &self,
        user_id: UserId,
        commitment_id: CommitmentId,
    ) -> CommitmentResult<DatedCommitment>;
    fn delete_weekly(&self, user_id: UserId, commitment_id: CommitmentId) -> CommitmentResult<()>;
    fn delete_dated(&self, user_id: UserId, commitment_id: CommitmentId) -> CommitmentResult<()>;
    /// Dated commitments on or after `from`.
    fn list_dated_from(
        &self,
        user_id: UserId,
        from: NaiveDate,
    ) -> CommitmentResult<Vec<DatedCommitment>>;
    /// Dated commitments that are over: dated before `today`, or dated
    /// `today` and ended at or before minute `now_minute`.
    fn list_dated_history(
        &self,
        user_id: UserId,
        today: NaiveDate,
        now_minute: i64,
    ) -> CommitmentResult<Vec<DatedCommitment>>;
    /// Replaces the caller's preferences.
    fn save_preferences(
        &self,
        user_id: UserId,
        preferences: &SchedulePreferences,
    ) -> CommitmentResult<()>;
}

pub struct SqliteCommitmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCommitmentRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> CommitmentResult<Self> {
        let expected_version = latest_version();
        let actual_version: u32 =
            conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(CommitmentError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        for table in ["weekly_commitments", "dated_commitments", "schedule_preferences"] {
            if !table_exists(conn, table)? {
                return Err(CommitmentError::MissingRequiredTable(table));
            }
        }
        Ok(Self { conn })
    }

    fn query_dated(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> CommitmentResult<Vec<DatedCommitment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_dated_row(row)?);
        }
        Ok(items)
    }
}

impl FixedCommitmentsProvider for SqliteCommitmentRepository<'_> {
    fn weekly_commitments(&self, user_id: UserId) -> CommitmentResult<Vec<WeeklyCommitment>> {
        let mut stmt = self.conn.prepare(
            "SELECT commitment_uuid, user_id, weekday, title, start_minute, end_minute
             FROM weekly_commitments
             WHERE user_id = ?1;",
        )?;
        let mut rows = stmt.query([user_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_weekly_row(row)?);
        }
        items.sort_by_key(|item: &WeeklyCommitment| (item.weekday, item.start, item.commitment_id));
        Ok(items)
    }

    fn dated_commitments_between(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CommitmentResult<Vec<DatedCommitment>> {
        self.query_dated(
            "SELECT commitment_uuid, user_id, date, title, description, start_minute, end_minute
             FROM dated_commitments
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, start_minute ASC, commitment_uuid ASC;",
            &[
                &user_id.to_string(),
                &from.format(DATE_FORMAT).to_string(),
                &to.format(DATE_FORMAT).to_string(),
            ],
        )
    }

    fn stored_preferences(&self, user_id: UserId) -> CommitmentResult<Option<SchedulePreferences>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT preferences_json FROM schedule_preferences WHERE user_id = ?1;",
                [user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|text| {
            serde_json::from_str(&text).map_err(|err| {
                CommitmentError::InvalidData(format!("invalid stored preferences: {err}"))
            })
        })
        .transpose()
    }
}

impl CommitmentRepository for SqliteCommitmentRepository<'_> {
    fn add_weekly(&self, commitment: &WeeklyCommitment) -> CommitmentResult<CommitmentId> {
        commitment.validate()?;
        self.conn.execute(
            "INSERT INTO weekly_commitments (
                commitment_uuid, user_id, weekday, title, start_minute, end_minute
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                commitment.commitment_id.to_string(),
                commitment.user_id.to_string(),
                commitment.weekday.as_db(),
                commitment.title.trim(),
                minute_of_day(commitment.start),
                minute_of_day(commitment.end),
            ],
        )?;
        Ok(commitment.commitment_id)
    }

    fn add_dated(&self, commitment: &DatedCommitment) -> CommitmentResult<CommitmentId> {
        commitment.validate()?;
        self.conn.execute(
            "INSERT INTO dated_commitments (
                commitment_uuid, user_id, date, title, description, start_minute, end_minute
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                commitment.commitment_id.to_string(),
                commitment.user_id.to_string(),
                commitment.date.format(DATE_FORMAT).to_string(),
                commitment.title.trim(),
                commitment.description.as_deref(),
                minute_of_day(commitment.start),
                minute_of_day(commitment.end),
            ],
        )?;
        Ok(commitment.commitment_id)
    }

    fn update_weekly(&self, commitment: &WeeklyCommitment) -> CommitmentResult<()> {
        commitment.validate()?;
        let changed = self.conn.execute(
            "UPDATE weekly_commitments
             SET weekday = ?3, title = ?4, start_minute = ?5, end_minute = ?6
             WHERE commitment_uuid = ?1 AND user_id = ?2;",
            params![
                commitment.commitment_id.to_string(),
                commitment.user_id.to_string(),
                commitment.weekday.as_db(),
                commitment.title.trim(),
                minute_of_day(commitment.start),
                minute_of_day(commitment.end),
            ],
        )?;
        if changed == 0 {
            return Err(CommitmentError::NotFound(commitment.commitment_id));
        }
        Ok(())
    }

    fn update_dated(&self, commitment: &DatedCommitment) -> CommitmentResult<()> {
        commitment.validate()?;
        let changed = self.conn.execute(
            "UPDATE dated_commitments
             SET date = ?3, title = ?4, description = ?5, start_minute = ?6, end_minute = ?7
             WHERE commitment_uuid = ?1 AND user_id = ?2;",
            params![
                commitment.commitment_id.to_string(),
                commitment.user_id.to_string(),
                commitment.date.format(DATE_FORMAT).to_string(),
                commitment.title.trim(),
                commitment.description.as_deref(),
                minute_of_day(commitment.start),
                minute_of_day(commitment.end),
            ],
        )?;
        if changed == 0 {
            return Err(CommitmentError::NotFound(commitment.commitment_id));
        }
        Ok(())
    }

    fn dated_commitment(
        &self,
        user_id: UserId,
        commitment_id: CommitmentId,
    ) -> CommitmentResult<DatedCommitment> {
        self.query_dated(
            &format!(
                "SELECT {DATED_COLUMNS}
                 FROM dated_commitments
                 WHERE commitment_uuid = ?1 AND user_id = ?2;"
            ),
            &[&commitment_id.to_string(), &user_id.to_string()],
        )?
        .into_iter()
        .next()
        .ok_or(CommitmentError::NotFound(commitment_id))
    }

    fn delete_weekly(&self, user_id: UserId, commitment_id: CommitmentId) -> CommitmentResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM weekly_commitments WHERE commitment_uuid = ?1 AND user_id = ?2;",
            params![commitment_id.to_string(), user_id.to_string()],
        )?;
        if changed == 0 {
            return Err(CommitmentError::NotFound(commitment_id));
        }
        Ok(())
    }

    fn delete_dated(&self, user_id: UserId, commitment_id: CommitmentId) -> CommitmentResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM dated_commitments WHERE commitment_uuid = ?1 AND user_id = ?2;",
            params![commitment_id.to_string(), user_id.to_string()],
        )?;
        if changed == 0 {
            return Err(CommitmentError::NotFound(commitment_id));
        }
        Ok(())
    }

    fn list_dated_from(
        &self,
        user_id: UserId,
        from: NaiveDate,
    ) -> CommitmentResult<Vec<DatedCommitment>> {
        self.query_dated(
            "SELECT commitment_uuid, user_id, date, title, description, start_minute, end_minute
             FROM dated_commitments
             WHERE user_id = ?1 AND date >= ?2
             ORDER BY date ASC, start_minute ASC, commitment_uuid ASC;",
            &[&user_id.to_string(), &from.format(DATE_FORMAT).to_string()],
        )
    }

    fn list_dated_history(
        &self,
        user_id: UserId,
        today: NaiveDate,
        now_minute: i64,
    ) -> CommitmentResult<Vec<DatedCommitment>> {
        self.query_dated(
            &format!(
                "SELECT {DATED_COLUMNS}
                 FROM dated_commitments
                 WHERE user_id = ?1
                   AND (date < ?2 OR (date = ?2 AND end_minute <= ?3))
                 ORDER BY date ASC, start_minute DESC, commitment_uuid ASC;"
            ),
            &[
                &user_id.to_string(),
                &today.format(DATE_FORMAT).to_string(),
                &now_minute,
            ],
        )
    }

    fn save_preferences(
        &self,
        user_id: UserId,
        preferences: &SchedulePreferences,
    ) -> CommitmentResult<()> {
        preferences.validate()?;
        let encoded = serde_json::to_string(preferences)
            .map_err(|err| CommitmentError::InvalidData(format!("cannot encode preferences: {err}")))?;
        self.conn.execute(
            "INSERT INTO schedule_preferences (user_id, preferences_json, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now') * 1000)
             ON CONFLICT(user_id) DO UPDATE SET
                 preferences_json = excluded.preferences_json,
                 updated_at = excluded.updated_at;",
            params![user_id.to_string(), encoded],
        )?;
        Ok(())
    }
}

fn parse_weekly_row(row: &Row<'_>) -> CommitmentResult<WeeklyCommitment> {
    let weekday_text: String = row.get(2)?;
    Ok(WeeklyCommitment {
        commitment_id: parse_uuid(row.get(0)?)?,
        user_id: parse_uuid(row.get(1)?)?,
        weekday: Weekday::from_db(&weekday_text).ok_or_else(|| {
            CommitmentError::InvalidData(format!("invalid weekday `{weekday_text}`"))
        })?,
        title: row.get(3)?,
        start: parse_minute(row.get(4)?)?,
        end: parse_minute(row.get(5)?)?,
    })
}

fn parse_dated_row(row: &Row<'_>) -> CommitmentResult<DatedCommitment> {
    let date_text: String = row.get(2)?;
    Ok(DatedCommitment {
        commitment_id: parse_uuid(row.get(0)?)?,
        user_id: parse_uuid(row.get(1)?)?,
        date: NaiveDate::parse_from_str(&date_text, DATE_FORMAT)
            .map_err(|_| CommitmentError::InvalidData(format!("invalid date `{date_text}`")))?,
        title: row.get(3)?,
        description: row.get(4)?,
        start: parse_minute(row.get(5)?)?,
        end: parse_minute(row.get(6)?)?,
    })
}

fn parse_uuid(value: String) -> CommitmentResult<Uuid> {
    Uuid::parse_str(&value)
        .map_err(|_| CommitmentError::InvalidData(format!("invalid uuid `{value}`")))
}

fn parse_minute(value: i64) -> CommitmentResult<NaiveTime> {
    from_minute_of_day(value)
        .ok_or_else(|| CommitmentError::InvalidData(format!("invalid minute `{value}`")))
}
