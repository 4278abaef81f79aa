//! Maintenance CLI.
//!
//! # Responsibility
//! - Print a linkage check when run without arguments.
//! - Run the weekly purge and report the next scheduled purge instant.
//!
//! Usage:
//! - `weekplan`
//! - `weekplan purge [--config <path>] [--db <path>]`
//! - `weekplan next-purge [--config <path>]`

use chrono::Utc;
use std::path::PathBuf;
use std::process::ExitCode;
use weekplan_core::db::open_db;
use weekplan_core::{
    init_logging, next_purge_at, run_weekly_purge, SqliteScheduleRepository, WeekplanConfig,
};

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("weekplan_core ping={}", weekplan_core::ping());
        println!("weekplan_core version={}", weekplan_core::core_version());
        return ExitCode::SUCCESS;
    };

    let outcome = parse_options(&args[1..]).and_then(|options| match command.as_str() {
        "purge" => purge(&options),
        "next-purge" => next_purge(&options),
        other => Err(format!("unknown command `{other}`; expected purge|next-purge")),
    });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| format!("missing value for `{flag}`"))?;
        match flag.as_str() {
            "--config" => options.config = Some(value),
            "--db" => options.db = Some(value),
            other => return Err(format!("unknown option `{other}`")),
        }
    }
    Ok(options)
}

fn load_config(options: &Options) -> Result<WeekplanConfig, String> {
    let config = match &options.config {
        Some(path) => WeekplanConfig::load(path),
        None => Ok(WeekplanConfig::default()),
    };
    let mut config = config
        .and_then(WeekplanConfig::with_env_overrides)
        .map_err(|err| err.to_string())?;
    if let Some(db) = &options.db {
        config.db_path = Some(db.clone());
    }

    if let Some(log_dir) = &config.log_dir {
        let level = config
            .log_level
            .clone()
            .unwrap_or_else(|| weekplan_core::default_log_level().to_string());
        init_logging(&level, &log_dir.to_string_lossy()).map_err(|err| err.to_string())?;
    }
    Ok(config)
}

fn purge(options: &Options) -> Result<(), String> {
    let config = load_config(options)?;
    let db_path = config
        .db_path
        .clone()
        .ok_or_else(|| "no database configured; pass --db or set WEEKPLAN_DB_PATH".to_string())?;

    let conn = open_db(&db_path).map_err(|err| format!("DB open failed: {err}"))?;
    let repo = SqliteScheduleRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let report =
        run_weekly_purge(&repo, config.purge_scope, Utc::now()).map_err(|err| err.to_string())?;
    println!(
        "purged weeks={} tasks={}",
        report.weeks_removed, report.tasks_removed
    );
    Ok(())
}

fn next_purge(options: &Options) -> Result<(), String> {
    let config = load_config(options)?;
    let timezone = config.reference_timezone().map_err(|err| err.to_string())?;
    let next = next_purge_at(Utc::now(), timezone);
    println!(
        "next purge at {} ({})",
        next.with_timezone(&timezone).format("%Y-%m-%d %H:%M %Z"),
        next.to_rfc3339()
    );
    Ok(())
}
