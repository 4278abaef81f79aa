//! Scheduled task and week read models.
//!
//! # Responsibility
//! - Define the closed task kind sum type and the proposer-facing subset.
//! - Define the week/day/task shapes returned to callers.
//!
//! # Invariants
//! - `TaskKind::Conflict` is never produced from proposer input; it is only
//!   set by conflict annotation and cleared by conflict resolution.
//! - `start < end` for every task.
//! - `conflicts_with` is symmetric across a week and empty unless the task
//!   kind is `Conflict`.

use crate::model::wall_time::hhmm;
use crate::model::weekday::Weekday;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persistent task identity, assigned by the store on insert.
pub type TaskId = i64;

/// Identity of the user owning a week. Issued by an external auth layer.
pub type UserId = Uuid;

/// Identity of one stored week instance.
pub type WeekId = Uuid;

/// Presentational kind of a stored task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Commitment that cannot move.
    Fixed,
    /// Routine activity.
    Basic,
    /// Free slot, always paired with a suggestion.
    Free,
    /// Runs alongside other tasks; never surfaced as upcoming.
    Background,
    /// Overlaps at least one other task of the same day.
    Conflict,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::Fixed,
        TaskKind::Basic,
        TaskKind::Free,
        TaskKind::Background,
        TaskKind::Conflict,
    ];

    /// Whether tasks of this kind may appear in the upcoming projection.
    pub fn is_upcoming_eligible(self) -> bool {
        matches!(self, Self::Fixed | Self::Basic | Self::Free)
    }

    /// Lowercase wire label, e.g. `conflict`.
    pub fn name(self) -> &'static str {
        self.as_db()
    }

    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Basic => "basic",
            Self::Free => "free",
            Self::Background => "background",
            Self::Conflict => "conflict",
        }
    }

    pub(crate) fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_db() == value)
    }
}

/// Kinds a proposer is allowed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposedKind {
    Fixed,
    Basic,
    Free,
    Background,
}

impl ProposedKind {
    /// Parses a proposer kind label, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(Self::Fixed),
            "basic" => Some(Self::Basic),
            "free" => Some(Self::Free),
            "background" => Some(Self::Background),
            _ => None,
        }
    }

    pub(crate) fn as_db(self) -> &'static str {
        TaskKind::from(self).as_db()
    }
}

impl From<ProposedKind> for TaskKind {
    fn from(value: ProposedKind) -> Self {
        match value {
            ProposedKind::Fixed => Self::Fixed,
            ProposedKind::Basic => Self::Basic,
            ProposedKind::Free => Self::Free,
            ProposedKind::Background => Self::Background,
        }
    }
}

/// One persisted task as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: TaskId,
    pub weekday: Weekday,
    pub description: String,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub kind: TaskKind,
    pub suggestion: Option<String>,
    pub hidden: bool,
    /// Ids of tasks overlapping this one, ascending.
    pub conflicts_with: Vec<TaskId>,
}

impl ScheduledTask {
    /// Whether the task still has unresolved conflict partners.
    pub fn is_conflicted(&self) -> bool {
        !self.conflicts_with.is_empty()
    }
}

/// One weekday bucket of a week view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayView {
    pub weekday: Weekday,
    /// Ordered by start time, then task id.
    pub tasks: Vec<ScheduledTask>,
}

/// The current week of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekView {
    pub week_id: WeekId,
    /// Identity of the proposal the week was built from.
    pub proposal_id: Uuid,
    /// Days in canonical order, Monday first. Only days present in the
    /// proposal are listed.
    pub days: Vec<DayView>,
}

impl WeekView {
    /// Iterates all tasks of the week in day order.
    pub fn tasks(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.days.iter().flat_map(|day| day.tasks.iter())
    }

    /// Looks up one task by id.
    pub fn task(&self, task_id: TaskId) -> Option<&ScheduledTask> {
        self.tasks().find(|task| task.task_id == task_id)
    }

    /// Returns one day bucket, if the week contains it.
    pub fn day(&self, weekday: Weekday) -> Option<&DayView> {
        self.days.iter().find(|day| day.weekday == weekday)
    }
}
