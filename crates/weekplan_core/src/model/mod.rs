//! Domain model for weekly schedules.
//!
//! # Responsibility
//! - Define canonical weekday, task kind and week view types.
//! - Define the untrusted proposal shape and its validated form.
//! - Define commitment and preference records used as proposer context.
//!
//! # Invariants
//! - Task identities (`TaskId`) are assigned by storage, never by callers.
//! - `TaskKind::Conflict` is reachable only through conflict annotation.

pub mod commitment;
pub mod preferences;
pub mod proposal;
pub mod task;
pub mod wall_time;
pub mod weekday;
