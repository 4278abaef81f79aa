//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories borrow a connection for their own lifetime; there is no
//!   shared ambient handle.
//! - Repository APIs return semantic errors (`TaskNotFound`, `NotOwner`) in
//!   addition to DB transport errors.

pub mod commitment_repo;
pub mod schedule_repo;
