//! Same-day interval overlap detection.

use crate::model::task::ScheduledTask;
use crate::model::weekday::Weekday;
use chrono::NaiveTime;
use std::collections::{BTreeMap, BTreeSet};

/// Position of a task in the flattened input slice.
pub type TaskIndex = usize;

/// Task index -> indices of every task it overlaps. Tasks without overlaps
/// are absent.
pub type ConflictMap = BTreeMap<TaskIndex, BTreeSet<TaskIndex>>;

/// A task placed on one weekday with a half-open `[start, end)` range.
pub trait Timeslot {
    fn weekday(&self) -> Weekday;
    fn start(&self) -> NaiveTime;
    fn end(&self) -> NaiveTime;
}

impl Timeslot for ScheduledTask {
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

/// Whether `[s1, e1)` and `[s2, e2)` overlap. Touching ranges do not.
pub fn ranges_overlap(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    s1 < e2 && s2 < e1
}

/// Compares every pair of tasks sharing a weekday and records overlaps in
/// both directions.
///
/// Input order is irrelevant and need not be sorted; cost is quadratic per
/// day.
pub fn detect_conflicts<T: Timeslot>(slots: &[T]) -> ConflictMap {
    let mut by_day: BTreeMap<Weekday, Vec<TaskIndex>> = BTreeMap::new();
    for (index, slot) in slots.iter().enumerate() {
        by_day.entry(slot.weekday()).or_default().push(index);
    }

    let mut conflicts = ConflictMap::new();
    for indices in by_day.values() {
        for (offset, &left) in indices.iter().enumerate() {
            for &right in &indices[offset + 1..] {
                let (a, b) = (&slots[left], &slots[right]);
                if ranges_overlap(a.start(), a.end(), b.start(), b.end()) {
                    conflicts.entry(left).or_default().insert(right);
                    conflicts.entry(right).or_default().insert(left);
                }
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::{detect_conflicts, ranges_overlap, Timeslot};
    use crate::model::weekday::Weekday;
    use chrono::NaiveTime;

    struct Slot(Weekday, NaiveTime, NaiveTime);

    impl Timeslot for Slot {
        fn weekday(&self) -> Weekday {
            self.0
        }
        fn start(&self) -> NaiveTime {
            self.1
        }
        fn end(&self) -> NaiveTime {
            self.2
        }
    }

    fn t(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn touching_boundaries_do_not_overlap() {
        assert!(!ranges_overlap(t(12, 0), t(13, 0), t(13, 0), t(14, 0)));
        assert!(ranges_overlap(t(9, 0), t(10, 30), t(10, 0), t(11, 0)));
    }

    #[test]
    fn identical_ranges_on_different_days_never_conflict() {
        let slots = [
            Slot(Weekday::Monday, t(9, 0), t(10, 0)),
            Slot(Weekday::Tuesday, t(9, 0), t(10, 0)),
        ];
        assert!(detect_conflicts(&slots).is_empty());
    }

    #[test]
    fn chained_overlaps_are_not_closed_transitively() {
        let slots = [
            Slot(Weekday::Friday, t(8, 0), t(9, 0)),
            Slot(Weekday::Friday, t(8, 30), t(9, 30)),
            Slot(Weekday::Friday, t(9, 0), t(10, 0)),
        ];
        let conflicts = detect_conflicts(&slots);
        assert_eq!(conflicts[&0].iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(conflicts[&1].iter().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(conflicts[&2].iter().copied().collect::<Vec<_>>(), vec![1]);
    }
}
