//! Conflict detection and annotation.
//!
//! # Responsibility
//! - Find same-day time overlaps between tasks (`detector`).
//! - Fold detected overlaps into persistable task records (`annotator`).
//!
//! # Invariants
//! - Detection is pure and deterministic; reruns yield identical maps.
//! - Conflicts are pairwise and symmetric; no transitive closure.
//! - Identities used here are in-memory arena indices, not storage ids.

pub mod annotator;
pub mod detector;
