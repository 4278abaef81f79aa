//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level schedule functions to Dart via FRB.
//! - Flatten core errors into `ok` / `error_code` / `message` envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every call opens its own connection; nothing is shared between calls.
//! - User identity arrives already authenticated as a UUID string.

use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use log::warn;
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;
use weekplan_core::db::open_db;
use weekplan_core::model::wall_time::{format_hhmm, parse_hhmm};
use weekplan_core::service::proposer::build_proposer_context;
use weekplan_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    parse_proposal_response, ping as ping_inner, CommitmentService, DatedCommitment,
    GenerationRequest, Proposal, ScheduleError, SchedulePreferences, ScheduleService,
    ScheduledTask,
    SqliteCommitmentRepository, SqliteScheduleRepository, WeekView, WeeklyCommitment,
    WeekplanConfig, Weekday,
};

const DB_FILE_NAME: &str = "weekplan.sqlite3";
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

#[derive(Debug, Clone, PartialEq)]
struct Runtime {
    db_path: PathBuf,
    timezone: Tz,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One task as shown to Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub task_id: i64,
    /// Canonical English weekday name.
    pub weekday: String,
    pub description: String,
    /// `HH:MM`.
    pub start: String,
    /// `HH:MM`.
    pub end: String,
    /// `fixed|basic|free|background|conflict`.
    pub kind: String,
    pub suggestion: Option<String>,
    pub hidden: bool,
    pub conflicts_with: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayItem {
    pub weekday: String,
    pub tasks: Vec<TaskItem>,
}

/// Week response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekResponse {
    pub ok: bool,
    /// `validation|not_found|unauthorized|persistence|upstream_generation`.
    pub error_code: Option<String>,
    pub message: String,
    pub week_id: Option<String>,
    pub days: Vec<DayItem>,
}

impl WeekResponse {
    fn success(message: impl Into<String>, week: WeekView) -> Self {
        Self {
            ok: true,
            error_code: None,
            message: message.into(),
            week_id: Some(week.week_id.to_string()),
            days: week
                .days
                .into_iter()
                .map(|day| DayItem {
                    weekday: day.weekday.name().to_string(),
                    tasks: day.tasks.into_iter().map(to_task_item).collect(),
                })
                .collect(),
        }
    }

    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_code: Some(code.to_string()),
            message: message.into(),
            week_id: None,
            days: Vec::new(),
        }
    }
}

/// Task list response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListResponse {
    pub ok: bool,
    pub error_code: Option<String>,
    pub message: String,
    pub items: Vec<TaskItem>,
}

/// Generic mutation response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    pub error_code: Option<String>,
    pub message: String,
    /// Other tasks touched by the call (removed or hidden partners).
    pub affected_task_ids: Vec<i64>,
}

impl ActionResponse {
    fn success(message: impl Into<String>, affected_task_ids: Vec<i64>) -> Self {
        Self {
            ok: true,
            error_code: None,
            message: message.into(),
            affected_task_ids,
        }
    }

    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_code: Some(code.to_string()),
            message: message.into(),
            affected_task_ids: Vec::new(),
        }
    }
}

/// Commitment row as shown to Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentItem {
    pub commitment_id: String,
    /// Weekday name for weekly rows, `YYYY-MM-DD` for dated rows.
    pub when: String,
    pub title: String,
    pub description: Option<String>,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentResponse {
    pub ok: bool,
    pub error_code: Option<String>,
    pub message: String,
    pub items: Vec<CommitmentItem>,
}

impl CommitmentResponse {
    fn success(message: impl Into<String>, items: Vec<CommitmentItem>) -> Self {
        Self {
            ok: true,
            error_code: None,
            message: message.into(),
            items,
        }
    }

    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_code: Some(code.to_string()),
            message: message.into(),
            items: Vec::new(),
        }
    }
}

/// Returns the caller's current week.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - `include_hidden=false` yields the active week.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn week_get(user_id: String, include_hidden: bool) -> WeekResponse {
    let result = with_schedule_service(&user_id, |service, caller| {
        if include_hidden {
            service.week(caller)
        } else {
            service.active_week(caller)
        }
    });
    match result {
        Ok(week) => WeekResponse::success("Week loaded.", week),
        Err((code, message)) => WeekResponse::failure(code, message),
    }
}

/// Replaces the caller's week with a JSON proposal
/// (`[{day, tasks: [{description, start, end, kind, suggestion?}]}]`).
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Malformed JSON is reported as `validation`.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn week_submit(user_id: String, proposal_json: String) -> WeekResponse {
    let proposal: Proposal = match serde_json::from_str(proposal_json.trim()) {
        Ok(proposal) => proposal,
        Err(err) => {
            return WeekResponse::failure("validation", format!("invalid proposal JSON: {err}"));
        }
    };
    match with_schedule_service(&user_id, |service, caller| {
        service.submit_proposal(caller, &proposal)
    }) {
        Ok(week) => WeekResponse::success("Week saved.", week),
        Err((code, message)) => WeekResponse::failure(code, message),
    }
}

/// Builds the proposer context for the caller as JSON.
///
/// `request_json` follows `GenerationRequest`
/// (`{profile?, intent, additional_details?, preferences?}`). The caller sends
/// the returned context to its proposer and hands the raw reply to
/// [`week_submit_generated`].
#[flutter_rust_bridge::frb(sync)]
pub fn week_generation_context(user_id: String, request_json: String) -> String {
    let outcome = (|| -> Result<String, String> {
        let caller = parse_user(&user_id).map_err(|(_, message)| message)?;
        let request: GenerationRequest = serde_json::from_str(request_json.trim())
            .map_err(|err| format!("invalid generation request: {err}"))?;
        request.preferences.validate().map_err(|err| err.to_string())?;
        let runtime = runtime()?;
        let conn = open_db(&runtime.db_path).map_err(|err| format!("DB open failed: {err}"))?;
        let repo = SqliteCommitmentRepository::try_new(&conn).map_err(|err| err.to_string())?;
        let today = Utc::now().with_timezone(&runtime.timezone).date_naive();
        let context = build_proposer_context(&repo, caller, &request, today)
            .map_err(|err| err.to_string())?;
        serde_json::to_string(&context).map_err(|err| err.to_string())
    })();
    outcome.unwrap_or_else(|message| {
        serde_json::json!({ "error": message }).to_string()
    })
}

/// Stores a week from raw proposer output.
///
/// Accepts plain JSON, fenced JSON, a bare array or a `schedule` wrapper.
/// Unreadable output is reported as `upstream_generation`.
#[flutter_rust_bridge::frb(sync)]
pub fn week_submit_generated(user_id: String, raw_output: String) -> WeekResponse {
    let proposal = match parse_proposal_response(&raw_output) {
        Ok(proposal) => proposal,
        Err(err) => {
            let err = ScheduleError::from(err);
            return WeekResponse::failure(err.code(), err.to_string());
        }
    };
    match with_schedule_service(&user_id, |service, caller| {
        service.submit_proposal(caller, &proposal)
    }) {
        Ok(week) => WeekResponse::success("Week generated.", week),
        Err((code, message)) => WeekResponse::failure(code, message),
    }
}

/// Keeps `task_id` and deletes every task it conflicts with.
#[flutter_rust_bridge::frb(sync)]
pub fn task_resolve_conflict(user_id: String, task_id: i64) -> ActionResponse {
    match with_schedule_service(&user_id, |service, caller| {
        service.resolve_conflict(task_id, caller)
    }) {
        Ok(outcome) => ActionResponse::success("Conflict resolved.", outcome.removed),
        Err((code, message)) => ActionResponse::failure(code, message),
    }
}

/// Hides or shows a task; showing hides its conflict partners.
#[flutter_rust_bridge::frb(sync)]
pub fn task_set_visibility(user_id: String, task_id: i64, hidden: bool) -> ActionResponse {
    match with_schedule_service(&user_id, |service, caller| {
        service.set_visibility(task_id, hidden, caller)
    }) {
        Ok(outcome) => ActionResponse::success("Visibility updated.", outcome.hidden_partners),
        Err((code, message)) => ActionResponse::failure(code, message),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn task_delete(user_id: String, task_id: i64) -> ActionResponse {
    match with_schedule_service(&user_id, |service, caller| {
        service.delete_task(task_id, caller)
    }) {
        Ok(()) => ActionResponse::success("Task deleted.", Vec::new()),
        Err((code, message)) => ActionResponse::failure(code, message),
    }
}

/// Next tasks of today that have not started yet.
#[flutter_rust_bridge::frb(sync)]
pub fn upcoming(user_id: String) -> TaskListResponse {
    match with_schedule_service(&user_id, |service, caller| {
        service.upcoming(caller, Utc::now())
    }) {
        Ok(tasks) => TaskListResponse {
            ok: true,
            error_code: None,
            message: format!("{} upcoming task(s).", tasks.len()),
            items: tasks.into_iter().map(to_task_item).collect(),
        },
        Err((code, message)) => TaskListResponse {
            ok: false,
            error_code: Some(code.to_string()),
            message,
            items: Vec::new(),
        },
    }
}

/// Adds a recurring weekly commitment.
#[flutter_rust_bridge::frb(sync)]
pub fn commitment_add_weekly(
    user_id: String,
    weekday: String,
    title: String,
    start: String,
    end: String,
) -> CommitmentResponse {
    let outcome = (|| -> Result<CommitmentItem, (&'static str, String)> {
        let weekday = Weekday::parse_label(&weekday)
            .ok_or(("validation", format!("unknown weekday `{weekday}`")))?;
        let (start, end) = parse_range(&start, &end)?;
        with_commitment_service(&user_id, |service, caller| {
            service
                .add_weekly(caller, weekday, title.trim(), start, end)
                .map(to_weekly_item)
        })
    })();
    match outcome {
        Ok(item) => CommitmentResponse::success("Commitment added.", vec![item]),
        Err((code, message)) => CommitmentResponse::failure(code, message),
    }
}

/// Adds a dated commitment; `date` is `YYYY-MM-DD` and may not be in the past.
#[flutter_rust_bridge::frb(sync)]
pub fn commitment_add_dated(
    user_id: String,
    date: String,
    title: String,
    description: Option<String>,
    start: String,
    end: String,
) -> CommitmentResponse {
    let outcome = (|| -> Result<CommitmentItem, (&'static str, String)> {
        let date = parse_date(&date)?;
        let (start, end) = parse_range(&start, &end)?;
        with_commitment_service(&user_id, |service, caller| {
            let mut draft = DatedCommitment::new(caller, date, title.trim(), start, end);
            draft.description = description.clone();
            service.add_dated(draft, Utc::now()).map(to_dated_item)
        })
    })();
    match outcome {
        Ok(item) => CommitmentResponse::success("Commitment added.", vec![item]),
        Err((code, message)) => CommitmentResponse::failure(code, message),
    }
}

/// Rewrites a weekly commitment owned by the caller.
#[flutter_rust_bridge::frb(sync)]
pub fn commitment_update_weekly(
    user_id: String,
    commitment_id: String,
    weekday: String,
    title: String,
    start: String,
    end: String,
) -> CommitmentResponse {
    let outcome = (|| -> Result<CommitmentItem, (&'static str, String)> {
        let commitment_id = parse_commitment_id(&commitment_id)?;
        let weekday = Weekday::parse_label(&weekday)
            .ok_or(("validation", format!("unknown weekday `{weekday}`")))?;
        let (start, end) = parse_range(&start, &end)?;
        with_commitment_service(&user_id, |service, caller| {
            service
                .update_weekly(caller, commitment_id, weekday, title.as_str(), start, end)
                .map(to_weekly_item)
        })
    })();
    match outcome {
        Ok(item) => CommitmentResponse::success("Commitment updated.", vec![item]),
        Err((code, message)) => CommitmentResponse::failure(code, message),
    }
}

/// Rewrites a dated commitment owned by the caller.
#[flutter_rust_bridge::frb(sync)]
pub fn commitment_update_dated(
    user_id: String,
    commitment_id: String,
    date: String,
    title: String,
    description: Option<String>,
    start: String,
    end: String,
) -> CommitmentResponse {
    let outcome = (|| -> Result<CommitmentItem, (&'static str, String)> {
        let commitment_id = parse_commitment_id(&commitment_id)?;
        let date = parse_date(&date)?;
        let (start, end) = parse_range(&start, &end)?;
        with_commitment_service(&user_id, |service, caller| {
            let mut draft = DatedCommitment::new(caller, date, title.as_str(), start, end);
            draft.commitment_id = commitment_id;
            draft.description = description.clone();
            service.update_dated(caller, draft).map(to_dated_item)
        })
    })();
    match outcome {
        Ok(item) => CommitmentResponse::success("Commitment updated.", vec![item]),
        Err((code, message)) => CommitmentResponse::failure(code, message),
    }
}

/// Dated commitments that are already over.
#[flutter_rust_bridge::frb(sync)]
pub fn commitment_history(user_id: String) -> CommitmentResponse {
    let outcome = with_commitment_service(&user_id, |service, caller| {
        service.list_dated_history(caller, Utc::now())
    });
    match outcome {
        Ok(items) => CommitmentResponse::success(
            format!("{} past commitment(s).", items.len()),
            items.into_iter().map(to_dated_item).collect(),
        ),
        Err((code, message)) => CommitmentResponse::failure(code, message),
    }
}

/// One dated commitment owned by the caller.
#[flutter_rust_bridge::frb(sync)]
pub fn commitment_detail(user_id: String, commitment_id: String) -> CommitmentResponse {
    let outcome = parse_commitment_id(&commitment_id).and_then(|commitment_id| {
        with_commitment_service(&user_id, |service, caller| {
            service.dated_detail(caller, commitment_id)
        })
    });
    match outcome {
        Ok(item) => CommitmentResponse::success("Commitment loaded.", vec![to_dated_item(item)]),
        Err((code, message)) => CommitmentResponse::failure(code, message),
    }
}

/// Preferences response envelope; `preferences_json` follows
/// `SchedulePreferences` and is empty on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferencesResponse {
    pub ok: bool,
    pub error_code: Option<String>,
    pub message: String,
    pub preferences_json: String,
}

impl PreferencesResponse {
    fn from_outcome(
        message: &str,
        outcome: Result<SchedulePreferences, (&'static str, String)>,
    ) -> Self {
        let encoded = outcome.and_then(|preferences| {
            serde_json::to_string(&preferences).map_err(|err| ("persistence", err.to_string()))
        });
        match encoded {
            Ok(preferences_json) => Self {
                ok: true,
                error_code: None,
                message: message.to_string(),
                preferences_json,
            },
            Err((code, message)) => Self {
                ok: false,
                error_code: Some(code.to_string()),
                message,
                preferences_json: String::new(),
            },
        }
    }
}

/// Returns the caller's stored scheduling preferences (empty when unset).
#[flutter_rust_bridge::frb(sync)]
pub fn preferences_get(user_id: String) -> PreferencesResponse {
    PreferencesResponse::from_outcome(
        "Preferences loaded.",
        with_commitment_service(&user_id, |service, caller| service.preferences(caller)),
    )
}

/// Replaces the caller's scheduling preferences with `preferences_json`.
#[flutter_rust_bridge::frb(sync)]
pub fn preferences_update(user_id: String, preferences_json: String) -> PreferencesResponse {
    let outcome = serde_json::from_str::<SchedulePreferences>(preferences_json.trim())
        .map_err(|err| ("validation", format!("invalid preferences JSON: {err}")))
        .and_then(|preferences| {
            with_commitment_service(&user_id, |service, caller| {
                service.update_preferences(caller, &preferences)?;
                Ok(preferences)
            })
        });
    PreferencesResponse::from_outcome("Preferences saved.", outcome)
}

/// Lists weekly commitments followed by dated commitments from today on.
#[flutter_rust_bridge::frb(sync)]
pub fn commitment_list(user_id: String) -> CommitmentResponse {
    let outcome = with_commitment_service(&user_id, |service, caller| {
        let mut items: Vec<CommitmentItem> = service
            .list_weekly(caller)?
            .into_iter()
            .map(to_weekly_item)
            .collect();
        items.extend(
            service
                .list_upcoming_dated(caller, Utc::now())?
                .into_iter()
                .map(to_dated_item),
        );
        Ok(items)
    });
    match outcome {
        Ok(items) => CommitmentResponse::success(format!("{} commitment(s).", items.len()), items),
        Err((code, message)) => CommitmentResponse::failure(code, message),
    }
}

/// Deletes a weekly or dated commitment owned by the caller.
#[flutter_rust_bridge::frb(sync)]
pub fn commitment_delete(user_id: String, commitment_id: String, dated: bool) -> CommitmentResponse {
    let outcome = parse_commitment_id(&commitment_id).and_then(|commitment_id| {
        with_commitment_service(&user_id, |service, caller| {
            if dated {
                service.delete_dated(caller, commitment_id)
            } else {
                service.delete_weekly(caller, commitment_id)
            }
        })
    });
    match outcome {
        Ok(()) => CommitmentResponse::success("Commitment deleted.", Vec::new()),
        Err((code, message)) => CommitmentResponse::failure(code, message),
    }
}

/// Resolves the process-wide runtime config.
///
/// Only a successful load is cached; a failed load is retried on the next
/// call so corrected environment variables are picked up.
fn runtime() -> Result<Runtime, String> {
    cached_or_load(&RUNTIME, load_runtime)
}

fn cached_or_load(
    cell: &OnceLock<Runtime>,
    load: impl FnOnce() -> Result<Runtime, String>,
) -> Result<Runtime, String> {
    if let Some(runtime) = cell.get() {
        return Ok(runtime.clone());
    }
    let loaded = load()?;
    Ok(cell.get_or_init(|| loaded).clone())
}

fn load_runtime() -> Result<Runtime, String> {
    let config = WeekplanConfig::default()
        .with_env_overrides()
        .map_err(|err| err.to_string())?;
    let timezone = config.reference_timezone().map_err(|err| err.to_string())?;
    Ok(Runtime {
        db_path: config
            .db_path
            .unwrap_or_else(|| std::env::temp_dir().join(DB_FILE_NAME)),
        timezone,
    })
}

fn parse_user(user_id: &str) -> Result<Uuid, (&'static str, String)> {
    Uuid::parse_str(user_id.trim())
        .map_err(|_| ("unauthorized", "caller identity is not a valid user id".to_string()))
}

fn parse_commitment_id(value: &str) -> Result<Uuid, (&'static str, String)> {
    Uuid::parse_str(value.trim())
        .map_err(|_| ("validation", format!("invalid commitment id `{value}`")))
}

fn parse_date(value: &str) -> Result<NaiveDate, (&'static str, String)> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ("validation", format!("invalid date `{value}`")))
}

fn parse_range(start: &str, end: &str) -> Result<(NaiveTime, NaiveTime), (&'static str, String)> {
    let start =
        parse_hhmm(start).ok_or(("validation", format!("invalid start time `{start}`")))?;
    let end = parse_hhmm(end).ok_or(("validation", format!("invalid end time `{end}`")))?;
    Ok((start, end))
}

fn with_schedule_service<T>(
    user_id: &str,
    f: impl FnOnce(&ScheduleService<SqliteScheduleRepository<'_>>, Uuid) -> Result<T, ScheduleError>,
) -> Result<T, (&'static str, String)> {
    let caller = parse_user(user_id)?;
    let runtime = runtime().map_err(|message| ("persistence", message))?;
    let conn = open_db(&runtime.db_path)
        .map_err(|err| ("persistence", format!("DB open failed: {err}")))?;
    let repo = SqliteScheduleRepository::try_new(&conn)
        .map_err(|err| ("persistence", format!("schedule repo init failed: {err}")))?;
    let service = ScheduleService::new(repo, runtime.timezone);
    f(&service, caller).map_err(|err| {
        warn!("event=ffi_call module=ffi status=error error_code={}", err.code());
        (err.code(), err.to_string())
    })
}

fn with_commitment_service<T>(
    user_id: &str,
    f: impl FnOnce(
        &CommitmentService<SqliteCommitmentRepository<'_>>,
        Uuid,
    ) -> weekplan_core::repo::commitment_repo::CommitmentResult<T>,
) -> Result<T, (&'static str, String)> {
    use weekplan_core::CommitmentError;

    let caller = parse_user(user_id)?;
    let runtime = runtime().map_err(|message| ("persistence", message))?;
    let conn = open_db(&runtime.db_path)
        .map_err(|err| ("persistence", format!("DB open failed: {err}")))?;
    let repo = SqliteCommitmentRepository::try_new(&conn)
        .map_err(|err| ("persistence", format!("commitment repo init failed: {err}")))?;
    let service = CommitmentService::new(repo, runtime.timezone);
    f(&service, caller).map_err(|err| {
        let code = match &err {
            CommitmentError::Validation(_) | CommitmentError::InvalidPreferences(_) => {
                "validation"
            }
            CommitmentError::NotFound(_) => "not_found",
            _ => "persistence",
        };
        warn!("event=ffi_call module=ffi status=error error_code={code}");
        (code, err.to_string())
    })
}

fn to_task_item(task: ScheduledTask) -> TaskItem {
    TaskItem {
        task_id: task.task_id,
        weekday: task.weekday.name().to_string(),
        description: task.description,
        start: format_hhmm(task.start),
        end: format_hhmm(task.end),
        kind: task.kind.name().to_string(),
        suggestion: task.suggestion,
        hidden: task.hidden,
        conflicts_with: task.conflicts_with,
    }
}

fn to_weekly_item(item: WeeklyCommitment) -> CommitmentItem {
    CommitmentItem {
        commitment_id: item.commitment_id.to_string(),
        when: item.weekday.name().to_string(),
        title: item.title,
        description: None,
        start: format_hhmm(item.start),
        end: format_hhmm(item.end),
    }
}

fn to_dated_item(item: DatedCommitment) -> CommitmentItem {
    CommitmentItem {
        commitment_id: item.commitment_id.to_string(),
        when: item.date.format("%Y-%m-%d").to_string(),
        title: item.title,
        description: item.description,
        start: format_hhmm(item.start),
        end: format_hhmm(item.end),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        commitment_add_dated, commitment_add_weekly, commitment_delete, commitment_detail,
        commitment_history, commitment_list, commitment_update_dated, commitment_update_weekly,
        core_version, init_logging, ping, preferences_get, preferences_update, task_delete,
        task_resolve_conflict, task_set_visibility, upcoming, week_get, week_generation_context,
        week_submit, week_submit_generated,
    };
    use super::{cached_or_load, Runtime};
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use uuid::Uuid;

    const OVERLAP_PROPOSAL: &str = r#"[
        {"day": "Tuesday", "tasks": [
            {"description": "Lecture", "start": "09:00", "end": "11:00", "kind": "fixed"},
            {"description": "Gym", "start": "10:00", "end": "11:30", "kind": "basic"},
            {"description": "Reading", "start": "13:00", "end": "14:00", "kind": "free", "suggestion": "Novel"}
        ]}
    ]"#;

    fn new_user() -> String {
        Uuid::new_v4().to_string()
    }

    #[test]
    fn failed_runtime_load_is_retried_and_success_is_cached() {
        let cell = OnceLock::new();
        let good = Runtime {
            db_path: PathBuf::from("/tmp/weekplan-runtime.sqlite3"),
            timezone: chrono_tz::Asia::Jakarta,
        };

        let first = cached_or_load(&cell, || Err("unknown timezone `Mars/Olympus`".to_string()));
        assert!(first.is_err());
        assert!(cell.get().is_none());

        assert_eq!(cached_or_load(&cell, || Ok(good.clone())), Ok(good.clone()));
        let cached = cached_or_load(&cell, || Err("must not reload".to_string()));
        assert_eq!(cached, Ok(good));
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn week_submit_then_get_round_trips_conflicts() {
        let user = new_user();
        let saved = week_submit(user.clone(), OVERLAP_PROPOSAL.to_string());
        assert!(saved.ok, "{}", saved.message);

        let loaded = week_get(user, true);
        assert!(loaded.ok, "{}", loaded.message);
        assert_eq!(loaded.days.len(), 1);
        let tasks = &loaded.days[0].tasks;
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].kind, "conflict");
        assert_eq!(tasks[1].kind, "conflict");
        assert_eq!(tasks[2].kind, "free");
        assert_eq!(tasks[0].conflicts_with, vec![tasks[1].task_id]);
    }

    #[test]
    fn week_get_reports_not_found_for_new_user() {
        let response = week_get(new_user(), true);
        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("not_found"));
    }

    #[test]
    fn week_submit_rejects_bad_json_and_bad_user() {
        let bad_json = week_submit(new_user(), "not json".to_string());
        assert_eq!(bad_json.error_code.as_deref(), Some("validation"));

        let bad_user = week_submit("nobody".to_string(), OVERLAP_PROPOSAL.to_string());
        assert_eq!(bad_user.error_code.as_deref(), Some("unauthorized"));
    }

    #[test]
    fn resolve_conflict_removes_partner_and_rejects_other_users() {
        let user = new_user();
        let saved = week_submit(user.clone(), OVERLAP_PROPOSAL.to_string());
        let lecture = saved.days[0].tasks[0].task_id;
        let gym = saved.days[0].tasks[1].task_id;

        let intruder = task_resolve_conflict(new_user(), lecture);
        assert_eq!(intruder.error_code.as_deref(), Some("unauthorized"));

        let resolved = task_resolve_conflict(user.clone(), lecture);
        assert!(resolved.ok, "{}", resolved.message);
        assert_eq!(resolved.affected_task_ids, vec![gym]);

        let week = week_get(user, true);
        assert_eq!(week.days[0].tasks.len(), 2);
        assert_eq!(week.days[0].tasks[0].kind, "fixed");
    }

    #[test]
    fn showing_a_task_hides_partners() {
        let user = new_user();
        let saved = week_submit(user.clone(), OVERLAP_PROPOSAL.to_string());
        let lecture = saved.days[0].tasks[0].task_id;
        let gym = saved.days[0].tasks[1].task_id;

        let shown = task_set_visibility(user.clone(), lecture, false);
        assert!(shown.ok, "{}", shown.message);
        assert_eq!(shown.affected_task_ids, vec![gym]);

        let active = week_get(user, false);
        assert!(active.days[0].tasks.iter().all(|task| task.task_id != gym));
    }

    #[test]
    fn delete_unknown_task_is_not_found() {
        let response = task_delete(new_user(), i64::MAX);
        assert_eq!(response.error_code.as_deref(), Some("not_found"));
    }

    #[test]
    fn upcoming_without_week_is_empty() {
        let response = upcoming(new_user());
        assert!(response.ok, "{}", response.message);
        assert!(response.items.is_empty());
    }

    #[test]
    fn generated_output_must_be_json() {
        let response = week_submit_generated(new_user(), "I could not plan that.".to_string());
        assert_eq!(response.error_code.as_deref(), Some("upstream_generation"));

        let fenced = format!("```json\n{OVERLAP_PROPOSAL}\n```");
        let response = week_submit_generated(new_user(), fenced);
        assert!(response.ok, "{}", response.message);
    }

    #[test]
    fn commitments_flow_into_generation_context() {
        let user = new_user();
        let added = commitment_add_weekly(
            user.clone(),
            "wednesday".to_string(),
            "Algorithms lecture".to_string(),
            "08:00".to_string(),
            "10:00".to_string(),
        );
        assert!(added.ok, "{}", added.message);

        let context = week_generation_context(user.clone(), r#"{"intent": "study"}"#.to_string());
        let value: serde_json::Value = serde_json::from_str(&context).expect("context json");
        assert_eq!(value["intent"], "study");
        assert_eq!(value["weekly_commitments"][0]["title"], "Algorithms lecture");

        let listed = commitment_list(user.clone());
        assert_eq!(listed.items.len(), 1);

        let deleted = commitment_delete(user, listed.items[0].commitment_id.clone(), false);
        assert!(deleted.ok, "{}", deleted.message);
    }

    #[test]
    fn commitment_rejects_reversed_range() {
        let response = commitment_add_weekly(
            new_user(),
            "Monday".to_string(),
            "Lab".to_string(),
            "10:00".to_string(),
            "09:00".to_string(),
        );
        assert_eq!(response.error_code.as_deref(), Some("validation"));
    }

    #[test]
    fn weekly_update_is_owner_scoped() {
        let user = new_user();
        let added = commitment_add_weekly(
            user.clone(),
            "Monday".to_string(),
            "Lab".to_string(),
            "08:00".to_string(),
            "10:00".to_string(),
        );
        let id = added.items[0].commitment_id.clone();

        let intruder = commitment_update_weekly(
            new_user(),
            id.clone(),
            "Tuesday".to_string(),
            "Taken".to_string(),
            "08:00".to_string(),
            "10:00".to_string(),
        );
        assert_eq!(intruder.error_code.as_deref(), Some("not_found"));

        let updated = commitment_update_weekly(
            user.clone(),
            id,
            "Selasa".to_string(),
            " Physics lab ".to_string(),
            "13:00".to_string(),
            "15:00".to_string(),
        );
        assert!(updated.ok, "{}", updated.message);

        let listed = commitment_list(user);
        assert_eq!(listed.items.len(), 1);
        assert_eq!(listed.items[0].when, "Tuesday");
        assert_eq!(listed.items[0].title, "Physics lab");
        assert_eq!(listed.items[0].start, "13:00");
    }

    #[test]
    fn dated_update_detail_and_history() {
        let user = new_user();
        let added = commitment_add_dated(
            user.clone(),
            "2999-01-04".to_string(),
            "Seminar".to_string(),
            None,
            "09:00".to_string(),
            "10:00".to_string(),
        );
        assert!(added.ok, "{}", added.message);
        let id = added.items[0].commitment_id.clone();

        let moved = commitment_update_dated(
            user.clone(),
            id.clone(),
            "2000-01-03".to_string(),
            "Seminar".to_string(),
            Some("Room 4".to_string()),
            "09:00".to_string(),
            "11:00".to_string(),
        );
        assert!(moved.ok, "{}", moved.message);

        let detail = commitment_detail(user.clone(), id.clone());
        assert!(detail.ok, "{}", detail.message);
        assert_eq!(detail.items[0].when, "2000-01-03");
        assert_eq!(detail.items[0].description.as_deref(), Some("Room 4"));
        assert_eq!(detail.items[0].end, "11:00");

        let history = commitment_history(user.clone());
        assert!(history.ok, "{}", history.message);
        assert_eq!(history.items.len(), 1);
        assert_eq!(history.items[0].commitment_id, id);

        let hidden = commitment_detail(new_user(), id);
        assert_eq!(hidden.error_code.as_deref(), Some("not_found"));
    }

    #[test]
    fn preferences_persist_and_feed_generation_context() {
        let user = new_user();
        let empty = preferences_get(user.clone());
        assert!(empty.ok, "{}", empty.message);
        let value: serde_json::Value = serde_json::from_str(&empty.preferences_json).expect("json");
        assert!(value["wake_time"].is_null());

        let invalid = preferences_update(
            user.clone(),
            r#"{"productive_start": "17:00", "productive_end": "09:00"}"#.to_string(),
        );
        assert_eq!(invalid.error_code.as_deref(), Some("validation"));

        let saved = preferences_update(
            user.clone(),
            r#"{"wake_time": "05:30", "lunch": {"time": "12:00", "duration_minutes": 45}}"#
                .to_string(),
        );
        assert!(saved.ok, "{}", saved.message);

        let context = week_generation_context(user, r#"{"intent": "study"}"#.to_string());
        let value: serde_json::Value = serde_json::from_str(&context).expect("context json");
        assert_eq!(value["preferences"]["wake_time"], "05:30");
        assert_eq!(value["preferences"]["lunch"]["duration_minutes"], 45);
    }
}
