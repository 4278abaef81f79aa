//! Folds a conflict map into persistable task records.
//!
//! The annotated week is the single source for both the stored rows and the
//! view returned right after a replace, so the two can never disagree on
//! conflict sets.

use crate::conflict::detector::{detect_conflicts, ConflictMap, TaskIndex, Timeslot};
use crate::model::proposal::ValidatedWeek;
use crate::model::task::{DayView, ProposedKind, ScheduledTask, TaskId, TaskKind, WeekId, WeekView};
use crate::model::weekday::Weekday;
use chrono::NaiveTime;
use uuid::Uuid;

/// Task record ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedTask {
    /// Arena index: position in the week flattened in proposal order.
    pub index: TaskIndex,
    pub weekday: Weekday,
    pub description: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// `Conflict` when `conflicts_with` is non-empty, else the proposed kind.
    pub kind: TaskKind,
    pub proposed_kind: ProposedKind,
    pub suggestion: Option<String>,
    /// Arena indices of overlapping tasks, ascending.
    pub conflicts_with: Vec<TaskIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedDay {
    pub weekday: Weekday,
    pub tasks: Vec<AnnotatedTask>,
}

/// Week ready for the store: validated, conflict-annotated, and stamped with
/// the identity of the proposal that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedWeek {
    proposal_id: Uuid,
    days: Vec<AnnotatedDay>,
}

struct ArenaSlot {
    weekday: Weekday,
    start: NaiveTime,
    end: NaiveTime,
}

impl Timeslot for ArenaSlot {
    fn weekday(&self) -> Weekday {
        self.weekday
    }

    fn start(&self) -> NaiveTime {
        self.start
    }

    fn end(&self) -> NaiveTime {
        self.end
    }
}

/// Runs detection over a validated week and annotates it in one pass.
pub fn annotate_week(week: &ValidatedWeek) -> AnnotatedWeek {
    let conflicts = detect_conflicts(&arena_slots(week));
    annotate(week, &conflicts)
}

/// Applies an existing conflict map, computed over the same arena order.
pub fn annotate(week: &ValidatedWeek, conflicts: &ConflictMap) -> AnnotatedWeek {
    let mut index = 0;
    let days = week
        .days()
        .iter()
        .map(|day| AnnotatedDay {
            weekday: day.weekday,
            tasks: day
                .tasks
                .iter()
                .map(|task| {
                    let partners = conflicts
                        .get(&index)
                        .map(|set| set.iter().copied().collect::<Vec<_>>())
                        .unwrap_or_default();
                    let kind = if partners.is_empty() {
                        TaskKind::from(task.kind)
                    } else {
                        TaskKind::Conflict
                    };
                    let annotated = AnnotatedTask {
                        index,
                        weekday: day.weekday,
                        description: task.description.clone(),
                        start: task.start,
                        end: task.end,
                        kind,
                        proposed_kind: task.kind,
                        suggestion: task.suggestion.clone(),
                        conflicts_with: partners,
                    };
                    index += 1;
                    annotated
                })
                .collect(),
        })
        .collect();

    AnnotatedWeek {
        proposal_id: Uuid::new_v4(),
        days,
    }
}

fn arena_slots(week: &ValidatedWeek) -> Vec<ArenaSlot> {
    week.days()
        .iter()
        .flat_map(|day| {
            day.tasks.iter().map(move |task| ArenaSlot {
                weekday: day.weekday,
                start: task.start,
                end: task.end,
            })
        })
        .collect()
}

impl AnnotatedWeek {
    pub fn proposal_id(&self) -> Uuid {
        self.proposal_id
    }

    /// Days in proposal order.
    pub fn days(&self) -> &[AnnotatedDay] {
        &self.days
    }

    /// All tasks in arena order.
    pub fn tasks(&self) -> impl Iterator<Item = &AnnotatedTask> {
        self.days.iter().flat_map(|day| day.tasks.iter())
    }

    pub fn task_count(&self) -> usize {
        self.days.iter().map(|day| day.tasks.len()).sum()
    }

    /// Number of tasks marked as conflicting.
    pub fn conflict_count(&self) -> usize {
        self.tasks()
            .filter(|task| task.kind == TaskKind::Conflict)
            .count()
    }

    /// Builds the caller view once storage ids are known.
    ///
    /// `task_ids[index]` must hold the id assigned to the task with that arena
    /// index.
    pub fn to_view(&self, week_id: WeekId, task_ids: &[TaskId]) -> WeekView {
        let mut days = self
            .days
            .iter()
            .map(|day| {
                let mut tasks = day
                    .tasks
                    .iter()
                    .map(|task| {
                        let mut conflicts_with = task
                            .conflicts_with
                            .iter()
                            .map(|partner| task_ids[*partner])
                            .collect::<Vec<_>>();
                        conflicts_with.sort_unstable();
                        ScheduledTask {
                            task_id: task_ids[task.index],
                            weekday: task.weekday,
                            description: task.description.clone(),
                            start: task.start,
                            end: task.end,
                            kind: task.kind,
                            suggestion: task.suggestion.clone(),
                            hidden: false,
                            conflicts_with,
                        }
                    })
                    .collect::<Vec<_>>();
                tasks.sort_by_key(|task| (task.start, task.task_id));
                DayView {
                    weekday: day.weekday,
                    tasks,
                }
            })
            .collect::<Vec<_>>();
        days.sort_by_key(|day| day.weekday);

        WeekView {
            week_id,
            proposal_id: self.proposal_id,
            days,
        }
    }
}
