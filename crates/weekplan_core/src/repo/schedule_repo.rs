//! Weekly schedule repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Replace a user's whole week atomically.
//! - Apply conflict resolution and visibility changes inside one transaction.
//! - Serve week and upcoming read projections.
//!
//! # Invariants
//! - Every mutation runs in a single `BEGIN IMMEDIATE` transaction; dropping
//!   the transaction on an error path rolls it back.
//! - Ownership is checked inside the mutating transaction, before any write.
//! - Conflict links are stored in both directions and vanish with either
//!   endpoint (`ON DELETE CASCADE`).
//! - Multi-statement reads run inside one read transaction so a concurrent
//!   replace is observed entirely or not at all.

use crate::conflict::annotator::AnnotatedWeek;
use crate::db::migrations::latest_version;
use crate::db::schema::{table_exists, table_has_column};
use crate::db::DbError;
use crate::model::task::{DayView, ScheduledTask, TaskId, TaskKind, UserId, WeekId, WeekView};
use crate::model::wall_time::{from_minute_of_day, minute_of_day};
use crate::model::weekday::Weekday;
use chrono::NaiveTime;
use log::{debug, info};
use once_cell::sync::Lazy;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    t.task_id AS task_id,
    d.weekday AS weekday,
    t.description AS description,
    t.start_minute AS start_minute,
    t.end_minute AS end_minute,
    t.kind AS kind,
    t.suggestion AS suggestion,
    t.is_hidden AS is_hidden
FROM tasks t
INNER JOIN days d ON d.day_id = t.day_id
INNER JOIN weeks w ON w.week_uuid = d.week_uuid";

static UPCOMING_KINDS_SQL: Lazy<String> = Lazy::new(|| {
    TaskKind::ALL
        .into_iter()
        .filter(|kind| kind.is_upcoming_eligible())
        .map(|kind| format!("'{}'", kind.as_db()))
        .collect::<Vec<_>>()
        .join(", ")
});

/// Result type used by schedule repository operations.
pub type ScheduleRepoResult<T> = Result<T, ScheduleRepoError>;

/// Errors from schedule repository operations.
#[derive(Debug)]
pub enum ScheduleRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Task does not exist.
    TaskNotFound(TaskId),
    /// Task exists but belongs to another user.
    NotOwner { task_id: TaskId, caller: UserId },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for ScheduleRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::NotOwner { task_id, caller } => {
                write!(f, "task {task_id} is not owned by user {caller}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "schedule repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "schedule repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "schedule repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid schedule data: {message}"),
        }
    }
}

impl Error for ScheduleRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ScheduleRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ScheduleRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Effect of resolving a conflict in favour of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub winner: TaskId,
    /// Whether the winner's kind changed to `fixed`.
    pub promoted: bool,
    /// Former partners of the winner, now deleted.
    pub removed: Vec<TaskId>,
    /// Tasks left without partners by the deletion, restored to their
    /// proposed kind.
    pub restored: Vec<TaskId>,
}

/// Effect of a visibility change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityOutcome {
    pub task_id: TaskId,
    pub hidden: bool,
    /// Partners forced hidden because the task was shown.
    pub hidden_partners: Vec<TaskId>,
}

/// Rows removed by a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub weeks_removed: usize,
    pub tasks_removed: usize,
}

/// Repository interface for weekly schedule storage.
pub trait ScheduleRepository {
    /// Replaces the user's current week with `week` in one transaction.
    fn replace_week(&self, user_id: UserId, week: &AnnotatedWeek) -> ScheduleRepoResult<WeekView>;
    /// Loads the user's current week, optionally hiding hidden tasks.
    fn load_week(&self, user_id: UserId, include_hidden: bool)
        -> ScheduleRepoResult<Option<WeekView>>;
    /// Deletes the target's partners and promotes the target.
    fn resolve_conflict(&self, task_id: TaskId, caller: UserId)
        -> ScheduleRepoResult<ResolutionOutcome>;
    /// Sets the hidden flag; showing a task hides its partners.
    fn set_visibility(
        &self,
        task_id: TaskId,
        hidden: bool,
        caller: UserId,
    ) -> ScheduleRepoResult<VisibilityOutcome>;
    /// Deletes one task, leaving partner kinds untouched.
    fn delete_task(&self, task_id: TaskId, caller: UserId) -> ScheduleRepoResult<()>;
    /// Lists visible upcoming-eligible tasks of one weekday starting strictly
    /// after `after_minute`, ascending, at most `limit` rows.
    fn upcoming_tasks(
        &self,
        user_id: UserId,
        weekday: Weekday,
        after_minute: i64,
        limit: usize,
    ) -> ScheduleRepoResult<Vec<ScheduledTask>>;
    /// Deletes every week (`None`) or weeks created before the cutoff (epoch
    /// ms), across all users.
    fn purge_weeks(&self, created_before_ms: Option<i64>) -> ScheduleRepoResult<PurgeReport>;
}

/// SQLite-backed schedule repository.
pub struct SqliteScheduleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteScheduleRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> ScheduleRepoResult<Self> {
        ensure_schedule_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ScheduleRepository for SqliteScheduleRepository<'_> {
    fn replace_week(&self, user_id: UserId, week: &AnnotatedWeek) -> ScheduleRepoResult<WeekView> {
        let started_at = Instant::now();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let replaced = tx.execute(
            "DELETE FROM weeks WHERE user_id = ?1;",
            [user_id.to_string()],
        )?;

        let week_id: WeekId = Uuid::new_v4();
        tx.execute(
            "INSERT INTO weeks (week_uuid, user_id, proposal_id) VALUES (?1, ?2, ?3);",
            params![
                week_id.to_string(),
                user_id.to_string(),
                week.proposal_id().to_string(),
            ],
        )?;

        // Phase one: rows without links, remembering arena index -> row id.
        let mut assigned: Vec<Option<TaskId>> = vec![None; week.task_count()];
        for day in week.days() {
            tx.execute(
                "INSERT INTO days (week_uuid, weekday) VALUES (?1, ?2);",
                params![week_id.to_string(), day.weekday.as_db()],
            )?;
            let day_id = tx.last_insert_rowid();

            for (position, task) in day.tasks.iter().enumerate() {
                tx.execute(
                    "INSERT INTO tasks (
                        day_id,
                        position,
                        description,
                        start_minute,
                        end_minute,
                        kind,
                        proposed_kind,
                        suggestion,
                        is_hidden
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0);",
                    params![
                        day_id,
                        position as i64,
                        task.description.as_str(),
                        minute_of_day(task.start),
                        minute_of_day(task.end),
                        task.kind.as_db(),
                        task.proposed_kind.as_db(),
                        task.suggestion.as_deref(),
                    ],
                )?;
                assigned[task.index] = Some(tx.last_insert_rowid());
            }
        }

        let task_ids = assigned
            .into_iter()
            .enumerate()
            .map(|(index, id)| {
                id.ok_or_else(|| {
                    ScheduleRepoError::InvalidData(format!(
                        "task arena index {index} was never inserted"
                    ))
                })
            })
            .collect::<ScheduleRepoResult<Vec<_>>>()?;

        // Phase two: translate arena partners to row ids.
        let mut links = 0usize;
        {
            let mut insert_link = tx.prepare(
                "INSERT INTO task_conflicts (task_id, partner_id) VALUES (?1, ?2);",
            )?;
            for task in week.tasks() {
                for partner in &task.conflicts_with {
                    insert_link.execute(params![task_ids[task.index], task_ids[*partner]])?;
                    links += 1;
                }
            }
        }

        tx.commit()?;
        info!(
            "event=week_replace module=repo status=ok replaced={} days={} tasks={} conflict_links={} duration_ms={}",
            replaced,
            week.days().len(),
            task_ids.len(),
            links,
            started_at.elapsed().as_millis()
        );

        Ok(week.to_view(week_id, &task_ids))
    }

    fn load_week(
        &self,
        user_id: UserId,
        include_hidden: bool,
    ) -> ScheduleRepoResult<Option<WeekView>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;

        let header: Option<(String, String)> = tx
            .query_row(
                "SELECT week_uuid, proposal_id FROM weeks WHERE user_id = ?1;",
                [user_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((week_text, proposal_text)) = header else {
            return Ok(None);
        };
        let week_id = parse_uuid(&week_text, "weeks.week_uuid")?;
        let proposal_id = parse_uuid(&proposal_text, "weeks.proposal_id")?;

        let mut buckets: BTreeMap<Weekday, Vec<ScheduledTask>> = BTreeMap::new();
        {
            let mut stmt = tx.prepare("SELECT weekday FROM days WHERE week_uuid = ?1;")?;
            let mut rows = stmt.query([week_text.as_str()])?;
            while let Some(row) = rows.next()? {
                let text: String = row.get(0)?;
                buckets.entry(parse_weekday(&text)?).or_default();
            }
        }

        let partners = load_week_partners(&tx, &week_text)?;
        {
            let mut stmt = tx.prepare(&format!(
                "{TASK_SELECT_SQL}
                 WHERE w.week_uuid = ?1
                   AND (?2 = 1 OR t.is_hidden = 0)
                 ORDER BY t.start_minute ASC, t.task_id ASC;"
            ))?;
            let mut rows = stmt.query(params![week_text.as_str(), bool_to_int(include_hidden)])?;
            while let Some(row) = rows.next()? {
                let mut task = parse_task_row(row)?;
                if let Some(ids) = partners.get(&task.task_id) {
                    task.conflicts_with = ids.iter().copied().collect();
                }
                buckets.entry(task.weekday).or_default().push(task);
            }
        }
        tx.commit()?;

        Ok(Some(WeekView {
            week_id,
            proposal_id,
            days: buckets
                .into_iter()
                .map(|(weekday, tasks)| DayView { weekday, tasks })
                .collect(),
        }))
    }

    fn resolve_conflict(
        &self,
        task_id: TaskId,
        caller: UserId,
    ) -> ScheduleRepoResult<ResolutionOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_task_owned(&tx, task_id, caller)?;

        let kind = load_task_kind(&tx, task_id)?;
        let losers = list_partner_ids(&tx, task_id)?;
        let mut bystanders = BTreeSet::new();
        for loser in &losers {
            for neighbour in list_partner_ids(&tx, *loser)? {
                if neighbour != task_id && !losers.contains(&neighbour) {
                    bystanders.insert(neighbour);
                }
            }
        }

        for loser in &losers {
            tx.execute("DELETE FROM tasks WHERE task_id = ?1;", [loser])?;
        }

        // The winner always ends up fixed with no partners, even when it had none.
        let promoted = kind != TaskKind::Fixed;
        tx.execute(
            "DELETE FROM task_conflicts WHERE task_id = ?1 OR partner_id = ?1;",
            [task_id],
        )?;
        tx.execute(
            "UPDATE tasks SET kind = 'fixed' WHERE task_id = ?1;",
            [task_id],
        )?;

        let mut restored = Vec::new();
        for bystander in bystanders {
            let changed = tx.execute(
                "UPDATE tasks
                 SET kind = proposed_kind
                 WHERE task_id = ?1
                   AND kind = 'conflict'
                   AND NOT EXISTS (
                     SELECT 1 FROM task_conflicts WHERE task_id = ?1
                   );",
                [bystander],
            )?;
            if changed == 1 {
                restored.push(bystander);
            }
        }

        tx.commit()?;
        info!(
            "event=conflict_resolve module=repo status=ok task_id={} promoted={} removed={} restored={}",
            task_id,
            promoted,
            losers.len(),
            restored.len()
        );

        Ok(ResolutionOutcome {
            winner: task_id,
            promoted,
            removed: losers.into_iter().collect(),
            restored,
        })
    }

    fn set_visibility(
        &self,
        task_id: TaskId,
        hidden: bool,
        caller: UserId,
    ) -> ScheduleRepoResult<VisibilityOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_task_owned(&tx, task_id, caller)?;

        tx.execute(
            "UPDATE tasks SET is_hidden = ?2 WHERE task_id = ?1;",
            params![task_id, bool_to_int(hidden)],
        )?;

        let mut hidden_partners = Vec::new();
        if !hidden {
            for partner in list_partner_ids(&tx, task_id)? {
                tx.execute(
                    "UPDATE tasks SET is_hidden = 1 WHERE task_id = ?1;",
                    [partner],
                )?;
                hidden_partners.push(partner);
            }
        }

        tx.commit()?;
        debug!(
            "event=task_visibility module=repo status=ok task_id={} hidden={} partners_hidden={}",
            task_id,
            hidden,
            hidden_partners.len()
        );

        Ok(VisibilityOutcome {
            task_id,
            hidden,
            hidden_partners,
        })
    }

    fn delete_task(&self, task_id: TaskId, caller: UserId) -> ScheduleRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_task_owned(&tx, task_id, caller)?;
        tx.execute("DELETE FROM tasks WHERE task_id = ?1;", [task_id])?;
        tx.commit()?;
        debug!("event=task_delete module=repo status=ok task_id={task_id}");
        Ok(())
    }

    fn upcoming_tasks(
        &self,
        user_id: UserId,
        weekday: Weekday,
        after_minute: i64,
        limit: usize,
    ) -> ScheduleRepoResult<Vec<ScheduledTask>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE w.user_id = ?1
               AND d.weekday = ?2
               AND t.kind IN ({upcoming_kinds})
               AND t.is_hidden = 0
               AND t.start_minute > ?3
             ORDER BY t.start_minute ASC, t.task_id ASC
             LIMIT ?4;",
            upcoming_kinds = UPCOMING_KINDS_SQL.as_str()
        ))?;
        let mut rows = stmt.query(params![
            user_id.to_string(),
            weekday.as_db(),
            after_minute,
            limit as i64,
        ])?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            let mut task = parse_task_row(row)?;
            task.conflicts_with = list_partner_ids(self.conn, task.task_id)?
                .into_iter()
                .collect();
            tasks.push(task);
        }
        Ok(tasks)
    }

    fn purge_weeks(&self, created_before_ms: Option<i64>) -> ScheduleRepoResult<PurgeReport> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let tasks_removed: i64 = tx.query_row(
            "SELECT COUNT(*)
             FROM tasks t
             INNER JOIN days d ON d.day_id = t.day_id
             INNER JOIN weeks w ON w.week_uuid = d.week_uuid
             WHERE ?1 IS NULL OR w.created_at < ?1;",
            [created_before_ms],
            |row| row.get(0),
        )?;
        let weeks_removed = tx.execute(
            "DELETE FROM weeks WHERE ?1 IS NULL OR created_at < ?1;",
            [created_before_ms],
        )?;

        tx.commit()?;
        Ok(PurgeReport {
            weeks_removed,
            tasks_removed: tasks_removed.max(0) as usize,
        })
    }
}

fn ensure_task_owned(conn: &Connection, task_id: TaskId, caller: UserId) -> ScheduleRepoResult<()> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT w.user_id
             FROM tasks t
             INNER JOIN days d ON d.day_id = t.day_id
             INNER JOIN weeks w ON w.week_uuid = d.week_uuid
             WHERE t.task_id = ?1;",
            [task_id],
            |row| row.get(0),
        )
        .optional()?;

    match owner {
        None => Err(ScheduleRepoError::TaskNotFound(task_id)),
        Some(text) if parse_uuid(&text, "weeks.user_id")? == caller => Ok(()),
        Some(_) => Err(ScheduleRepoError::NotOwner { task_id, caller }),
    }
}

fn load_task_kind(conn: &Connection, task_id: TaskId) -> ScheduleRepoResult<TaskKind> {
    let text: String = conn.query_row(
        "SELECT kind FROM tasks WHERE task_id = ?1;",
        [task_id],
        |row| row.get(0),
    )?;
    TaskKind::from_db(&text)
        .ok_or_else(|| ScheduleRepoError::InvalidData(format!("invalid kind `{text}` in tasks.kind")))
}

fn list_partner_ids(conn: &Connection, task_id: TaskId) -> ScheduleRepoResult<BTreeSet<TaskId>> {
    let mut stmt = conn.prepare(
        "SELECT partner_id FROM task_conflicts WHERE task_id = ?1 ORDER BY partner_id ASC;",
    )?;
    let mut rows = stmt.query([task_id])?;
    let mut ids = BTreeSet::new();
    while let Some(row) = rows.next()? {
        ids.insert(row.get::<_, TaskId>(0)?);
    }
    Ok(ids)
}

fn load_week_partners(
    conn: &Connection,
    week_uuid: &str,
) -> ScheduleRepoResult<BTreeMap<TaskId, BTreeSet<TaskId>>> {
    let mut stmt = conn.prepare(
        "SELECT c.task_id, c.partner_id
         FROM task_conflicts c
         INNER JOIN tasks t ON t.task_id = c.task_id
         INNER JOIN days d ON d.day_id = t.day_id
         WHERE d.week_uuid = ?1;",
    )?;
    let mut rows = stmt.query([week_uuid])?;
    let mut partners: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        partners
            .entry(row.get(0)?)
            .or_default()
            .insert(row.get(1)?);
    }
    Ok(partners)
}

fn parse_task_row(row: &Row<'_>) -> ScheduleRepoResult<ScheduledTask> {
    let weekday_text: String = row.get("weekday")?;
    let kind_text: String = row.get("kind")?;
    let kind = TaskKind::from_db(&kind_text).ok_or_else(|| {
        ScheduleRepoError::InvalidData(format!("invalid kind `{kind_text}` in tasks.kind"))
    })?;

    let parse_minute = |column: &'static str| -> ScheduleRepoResult<NaiveTime> {
        let value: i64 = row.get(column)?;
        from_minute_of_day(value).ok_or_else(|| {
            ScheduleRepoError::InvalidData(format!("invalid minute `{value}` in tasks.{column}"))
        })
    };

    let is_hidden = match row.get::<_, i64>("is_hidden")? {
        0 => false,
        1 => true,
        other => {
            return Err(ScheduleRepoError::InvalidData(format!(
                "invalid is_hidden value `{other}` in tasks.is_hidden"
            )));
        }
    };

    Ok(ScheduledTask {
        task_id: row.get("task_id")?,
        weekday: parse_weekday(&weekday_text)?,
        description: row.get("description")?,
        start: parse_minute("start_minute")?,
        end: parse_minute("end_minute")?,
        kind,
        suggestion: row.get("suggestion")?,
        hidden: is_hidden,
        conflicts_with: Vec::new(),
    })
}

fn parse_weekday(value: &str) -> ScheduleRepoResult<Weekday> {
    Weekday::from_db(value)
        .ok_or_else(|| ScheduleRepoError::InvalidData(format!("invalid weekday `{value}`")))
}

fn parse_uuid(value: &str, column: &'static str) -> ScheduleRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| ScheduleRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("weeks", &["week_uuid", "user_id", "proposal_id", "created_at"]),
    ("days", &["day_id", "week_uuid", "weekday"]),
    (
        "tasks",
        &[
            "task_id",
            "day_id",
            "position",
            "description",
            "start_minute",
            "end_minute",
            "kind",
            "proposed_kind",
            "suggestion",
            "is_hidden",
        ],
    ),
    ("task_conflicts", &["task_id", "partner_id"]),
];

fn ensure_schedule_connection_ready(conn: &Connection) -> ScheduleRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(ScheduleRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(ScheduleRepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(ScheduleRepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}
