//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep FFI/CLI layers decoupled from storage details.

pub mod commitment_service;
pub mod proposer;
pub mod schedule_service;
