use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;
use weekplan_core::db::open_db_in_memory;
use weekplan_core::{
    Proposal, ProposedDay, ProposedTask, ScheduleService, SqliteScheduleRepository, UPCOMING_LIMIT,
};

fn task(description: &str, start: &str, end: &str, kind: &str) -> ProposedTask {
    ProposedTask {
        description: description.to_string(),
        start: start.to_string(),
        end: end.to_string(),
        kind: kind.to_string(),
        suggestion: (kind == "free").then(|| "Read a novel".to_string()),
    }
}

fn week() -> Proposal {
    Proposal {
        days: vec![
            ProposedDay {
                day: "Monday".to_string(),
                tasks: vec![
                    task("Breakfast", "07:00", "07:30", "basic"),
                    task("Lecture", "09:00", "11:00", "fixed"),
                    task("Podcast", "12:00", "12:30", "background"),
                    task("Lunch", "12:30", "13:00", "basic"),
                    task("Reading", "14:00", "15:00", "free"),
                    task("Gym", "18:00", "19:00", "basic"),
                ],
            },
            ProposedDay {
                day: "Tuesday".to_string(),
                tasks: vec![task("Swim", "10:00", "11:00", "basic")],
            },
        ],
    }
}

/// 2026-10-19 is a Monday; Jakarta is UTC+7.
fn jakarta(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Jakarta
        .with_ymd_and_hms(2026, 10, 19, hour, minute, second)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

fn descriptions(tasks: &[weekplan_core::ScheduledTask]) -> Vec<&str> {
    tasks.iter().map(|task| task.description.as_str()).collect()
}

#[test]
fn returns_at_most_two_tasks_strictly_after_now() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    service.submit_proposal(user, &week()).unwrap();

    let upcoming = service.upcoming(user, jakarta(8, 59, 30)).unwrap();
    assert_eq!(upcoming.len(), UPCOMING_LIMIT);
    assert_eq!(descriptions(&upcoming), vec!["Lecture", "Lunch"]);

    let at_start = service.upcoming(user, jakarta(9, 0, 0)).unwrap();
    assert_eq!(descriptions(&at_start), vec!["Lunch", "Reading"]);
}

#[test]
fn nothing_left_late_in_the_day_and_other_days_never_leak() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    service.submit_proposal(user, &week()).unwrap();

    assert!(service.upcoming(user, jakarta(18, 30, 0)).unwrap().is_empty());
    assert!(service.upcoming(Uuid::new_v4(), jakarta(6, 0, 0)).unwrap().is_empty());
}

#[test]
fn local_weekday_comes_from_the_reference_timezone() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    service.submit_proposal(user, &week()).unwrap();

    // Still Sunday in UTC, already Monday 06:30 in Jakarta.
    let now = Utc.with_ymd_and_hms(2026, 10, 18, 23, 30, 0).single().unwrap();
    let upcoming = service.upcoming(user, now).unwrap();
    assert_eq!(descriptions(&upcoming), vec!["Breakfast", "Lecture"]);
}

#[test]
fn hidden_and_conflicted_tasks_are_skipped() {
    let conn = open_db_in_memory().unwrap();
    let service = ScheduleService::new(
        SqliteScheduleRepository::try_new(&conn).unwrap(),
        chrono_tz::Asia::Jakarta,
    );
    let user = Uuid::new_v4();
    let mut proposal = week();
    proposal.days[0]
        .tasks
        .push(task("Call", "09:30", "10:00", "basic"));
    let saved = service.submit_proposal(user, &proposal).unwrap();

    let lunch = saved
        .tasks()
        .find(|task| task.description == "Lunch")
        .unwrap()
        .task_id;
    service.set_visibility(lunch, true, user).unwrap();

    // Lecture and Call overlap, so both are conflicts.
    let upcoming = service.upcoming(user, jakarta(8, 0, 0)).unwrap();
    assert_eq!(descriptions(&upcoming), vec!["Reading", "Gym"]);
}
