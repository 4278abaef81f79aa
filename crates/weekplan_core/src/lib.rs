//! Core domain logic for the weekly planner.
//! This crate is the single source of truth for schedule invariants.

pub mod config;
pub mod conflict;
pub mod db;
pub mod logging;
pub mod maintenance;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, WeekplanConfig};
pub use conflict::annotator::{annotate_week, AnnotatedWeek};
pub use conflict::detector::{detect_conflicts, ConflictMap, Timeslot};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use maintenance::{next_purge_at, run_weekly_purge, PurgeScope};
pub use model::commitment::{DatedCommitment, WeeklyCommitment};
pub use model::preferences::SchedulePreferences;
pub use model::proposal::{Proposal, ProposalError, ProposedDay, ProposedTask};
pub use model::task::{DayView, ScheduledTask, TaskId, TaskKind, UserId, WeekView};
pub use model::weekday::Weekday;
pub use repo::commitment_repo::{
    CommitmentError, CommitmentRepository, FixedCommitmentsProvider, SqliteCommitmentRepository,
};
pub use repo::schedule_repo::{
    PurgeReport, ResolutionOutcome, ScheduleRepoError, ScheduleRepository,
    SqliteScheduleRepository, VisibilityOutcome,
};
pub use service::commitment_service::CommitmentService;
pub use service::proposer::{
    parse_proposal_response, GenerationRequest, ProposerContext, ProposerFailure,
    ScheduleProposer, UserProfile,
};
pub use service::schedule_service::{ScheduleError, ScheduleService, UPCOMING_LIMIT};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
