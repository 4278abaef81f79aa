use uuid::Uuid;
use weekplan_core::db::open_db_in_memory;
use weekplan_core::service::schedule_service::Missing;
use weekplan_core::{
    Proposal, ProposedDay, ProposedTask, ScheduleError, ScheduleService, SqliteScheduleRepository,
    TaskId, TaskKind, WeekView, Weekday,
};

fn task(description: &str, start: &str, end: &str, kind: &str) -> ProposedTask {
    ProposedTask {
        description: description.to_string(),
        start: start.to_string(),
        end: end.to_string(),
        kind: kind.to_string(),
        suggestion: None,
    }
}

/// Monday: A 09:00-11:00 overlaps B 10:00-12:00, B overlaps C 11:30-13:00,
/// D 15:00-16:00 stands alone.
fn chain_proposal() -> Proposal {
    Proposal {
        days: vec![ProposedDay {
            day: "Monday".to_string(),
            tasks: vec![
                task("A", "09:00", "11:00", "fixed"),
                task("B", "10:00", "12:00", "basic"),
                task("C", "11:30", "13:00", "basic"),
                task("D", "15:00", "16:00", "basic"),
            ],
        }],
    }
}

fn ids(week: &WeekView) -> (TaskId, TaskId, TaskId, TaskId) {
    let tasks = &week.day(Weekday::Monday).unwrap().tasks;
    (
        tasks[0].task_id,
        tasks[1].task_id,
        tasks[2].task_id,
        tasks[3].task_id,
    )
}

#[test]
fn resolving_keeps_winner_and_deletes_its_partners() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    let (a, b, c, d) = ids(&service.submit_proposal(user, &chain_proposal()).unwrap());

    let outcome = service.resolve_conflict(a, user).unwrap();
    assert_eq!(outcome.winner, a);
    assert!(outcome.promoted);
    assert_eq!(outcome.removed, vec![b]);
    assert_eq!(outcome.restored, vec![c]);

    let week = service.week(user).unwrap();
    assert!(week.task(b).is_none());
    let winner = week.task(a).unwrap();
    assert_eq!(winner.kind, TaskKind::Fixed);
    assert!(winner.conflicts_with.is_empty());
    let bystander = week.task(c).unwrap();
    assert_eq!(bystander.kind, TaskKind::Basic);
    assert!(bystander.conflicts_with.is_empty());
    assert_eq!(week.task(d).unwrap().kind, TaskKind::Basic);
}

#[test]
fn resolving_the_middle_task_removes_both_neighbours() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    let (a, b, c, d) = ids(&service.submit_proposal(user, &chain_proposal()).unwrap());

    let outcome = service.resolve_conflict(b, user).unwrap();
    assert_eq!(outcome.removed, vec![a, c]);
    assert!(outcome.restored.is_empty());

    let remaining: Vec<TaskId> = service.week(user).unwrap().tasks().map(|t| t.task_id).collect();
    assert_eq!(remaining, vec![b, d]);
    let links: i64 = conn
        .query_row("SELECT COUNT(*) FROM task_conflicts;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(links, 0);
}

#[test]
fn resolving_an_unconflicted_task_fixes_it_without_deleting() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    let before = service.submit_proposal(user, &chain_proposal()).unwrap();
    let (a, b, c, d) = ids(&before);

    let outcome = service.resolve_conflict(d, user).unwrap();
    assert!(outcome.promoted);
    assert!(outcome.removed.is_empty());
    assert!(outcome.restored.is_empty());

    let after = service.week(user).unwrap();
    let winner = after.task(d).unwrap();
    assert_eq!(winner.kind, TaskKind::Fixed);
    assert!(winner.conflicts_with.is_empty());
    for id in [a, b, c] {
        assert_eq!(after.task(id), before.task(id));
    }
}

#[test]
fn resolving_a_fixed_task_again_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    let (_, _, _, d) = ids(&service.submit_proposal(user, &chain_proposal()).unwrap());
    service.resolve_conflict(d, user).unwrap();
    let settled = service.week(user).unwrap();

    let outcome = service.resolve_conflict(d, user).unwrap();
    assert!(!outcome.promoted);
    assert!(outcome.removed.is_empty());
    assert_eq!(service.week(user).unwrap(), settled);
}

/// Monday: A 08:00-10:00, B 09:00-09:30 and C 09:15-09:45 all overlap.
#[test]
fn resolving_inside_a_fully_overlapping_group_removes_everyone_else() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    let proposal = Proposal {
        days: vec![ProposedDay {
            day: "Monday".to_string(),
            tasks: vec![
                task("A", "08:00", "10:00", "fixed"),
                task("B", "09:00", "09:30", "basic"),
                task("C", "09:15", "09:45", "basic"),
            ],
        }],
    };
    let week = service.submit_proposal(user, &proposal).unwrap();
    let tasks = &week.day(Weekday::Monday).unwrap().tasks;
    let (a, b, c) = (tasks[0].task_id, tasks[1].task_id, tasks[2].task_id);
    assert_eq!(tasks[0].conflicts_with, vec![b, c]);
    assert_eq!(tasks[1].conflicts_with, vec![a, c]);
    assert_eq!(tasks[2].conflicts_with, vec![a, b]);

    let outcome = service.resolve_conflict(a, user).unwrap();
    assert_eq!(outcome.removed, vec![b, c]);
    assert!(outcome.restored.is_empty());

    let after = service.week(user).unwrap();
    let remaining: Vec<TaskId> = after.tasks().map(|t| t.task_id).collect();
    assert_eq!(remaining, vec![a]);
    let winner = after.task(a).unwrap();
    assert_eq!(winner.kind, TaskKind::Fixed);
    assert!(winner.conflicts_with.is_empty());
}

#[test]
fn other_users_cannot_resolve_and_nothing_changes() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let before = service.submit_proposal(owner, &chain_proposal()).unwrap();
    let (a, _, _, _) = ids(&before);

    let err = service.resolve_conflict(a, intruder).unwrap_err();
    assert!(matches!(err, ScheduleError::Unauthorized { task_id, caller } if task_id == a && caller == intruder));
    assert_eq!(service.week(owner).unwrap(), before);
}

#[test]
fn unknown_task_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let err = service.resolve_conflict(4242, Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, ScheduleError::NotFound(Missing::Task(4242))));
}

#[test]
fn delete_keeps_partner_kind_until_it_is_resolved() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    let (a, b, _, _) = ids(&service.submit_proposal(user, &chain_proposal()).unwrap());

    service.delete_task(b, user).unwrap();
    let week = service.week(user).unwrap();
    let orphan = week.task(a).unwrap();
    assert_eq!(orphan.kind, TaskKind::Conflict);
    assert!(orphan.conflicts_with.is_empty());

    let outcome = service.resolve_conflict(a, user).unwrap();
    assert!(outcome.promoted);
    assert!(outcome.removed.is_empty());
    assert_eq!(service.week(user).unwrap().task(a).unwrap().kind, TaskKind::Fixed);
}

#[test]
fn delete_checks_ownership() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let owner = Uuid::new_v4();
    let (a, _, _, _) = ids(&service.submit_proposal(owner, &chain_proposal()).unwrap());

    let err = service.delete_task(a, Uuid::new_v4()).unwrap_err();
    assert_eq!(err.code(), "unauthorized");
    assert!(service.week(owner).unwrap().task(a).is_some());
}
