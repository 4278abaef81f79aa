use chrono::NaiveTime;
use std::collections::BTreeSet;
use weekplan_core::model::task::TaskKind;
use weekplan_core::{
    annotate_week, detect_conflicts, Proposal, ProposedDay, ProposedTask, Timeslot, Weekday,
};

struct Slot {
    weekday: Weekday,
    start: NaiveTime,
    end: NaiveTime,
}

impl Timeslot for Slot {
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

fn hm(value: &str) -> NaiveTime {
    NaiveTime::parse_from_str(value, "%H:%M").unwrap()
}

fn slot(weekday: Weekday, start: &str, end: &str) -> Slot {
    Slot {
        weekday,
        start: hm(start),
        end: hm(end),
    }
}

fn task(description: &str, start: &str, end: &str, kind: &str) -> ProposedTask {
    ProposedTask {
        description: description.to_string(),
        start: start.to_string(),
        end: end.to_string(),
        kind: kind.to_string(),
        suggestion: None,
    }
}

#[test]
fn pairwise_overlaps_are_not_transitive() {
    // A overlaps B, B overlaps C, A and C do not touch.
    let slots = [
        slot(Weekday::Monday, "09:00", "11:00"),
        slot(Weekday::Monday, "10:00", "12:00"),
        slot(Weekday::Monday, "11:30", "13:00"),
    ];

    let map = detect_conflicts(&slots);

    assert_eq!(map[&0], BTreeSet::from([1]));
    assert_eq!(map[&1], BTreeSet::from([0, 2]));
    assert_eq!(map[&2], BTreeSet::from([1]));
}

#[test]
fn fully_overlapping_group_links_every_pair() {
    let slots = [
        slot(Weekday::Monday, "08:00", "10:00"),
        slot(Weekday::Monday, "09:00", "09:30"),
        slot(Weekday::Monday, "09:15", "09:45"),
    ];

    let map = detect_conflicts(&slots);

    assert_eq!(map[&0], BTreeSet::from([1, 2]));
    assert_eq!(map[&1], BTreeSet::from([0, 2]));
    assert_eq!(map[&2], BTreeSet::from([0, 1]));
}

#[test]
fn touching_ranges_do_not_conflict() {
    let slots = [
        slot(Weekday::Friday, "09:00", "10:00"),
        slot(Weekday::Friday, "10:00", "11:00"),
    ];
    assert!(detect_conflicts(&slots).is_empty());
}

#[test]
fn same_time_on_different_days_does_not_conflict() {
    let slots = [
        slot(Weekday::Monday, "09:00", "10:00"),
        slot(Weekday::Tuesday, "09:00", "10:00"),
    ];
    assert!(detect_conflicts(&slots).is_empty());
}

#[test]
fn detection_is_symmetric_and_idempotent() {
    let slots = [
        slot(Weekday::Sunday, "08:00", "12:00"),
        slot(Weekday::Sunday, "09:00", "09:30"),
        slot(Weekday::Sunday, "11:59", "12:30"),
        slot(Weekday::Sunday, "20:00", "21:00"),
    ];

    let first = detect_conflicts(&slots);
    let second = detect_conflicts(&slots);
    assert_eq!(first, second);

    for (task, partners) in &first {
        assert!(!partners.contains(task));
        for partner in partners {
            assert!(first[partner].contains(task), "{task} <-> {partner}");
        }
    }
    assert!(!first.contains_key(&3));
}

#[test]
fn annotation_marks_only_overlapping_tasks_as_conflict() {
    let proposal = Proposal {
        days: vec![
            ProposedDay {
                day: "Monday".to_string(),
                tasks: vec![
                    task("Lecture", "09:00", "11:00", "fixed"),
                    task("Gym", "10:30", "11:30", "basic"),
                    task("Music", "09:00", "17:00", "background"),
                ],
            },
            ProposedDay {
                day: "Tuesday".to_string(),
                tasks: vec![task("Lecture", "09:00", "11:00", "fixed")],
            },
        ],
    };

    let annotated = annotate_week(&proposal.validate().unwrap());
    let kinds: Vec<TaskKind> = annotated.tasks().map(|task| task.kind).collect();

    assert_eq!(
        kinds,
        vec![
            TaskKind::Conflict,
            TaskKind::Conflict,
            TaskKind::Conflict,
            TaskKind::Fixed,
        ]
    );
    assert_eq!(annotated.conflict_count(), 3);
    let first = annotated.tasks().next().unwrap();
    assert_eq!(first.conflicts_with, vec![1, 2]);
}
