//! Domain model for matrix-classified tasks and their owners.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep derived classification fields behind a single mutation path.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - `quadrant` always equals `classify(is_important, is_urgent)`.

pub mod task;
pub mod user;
