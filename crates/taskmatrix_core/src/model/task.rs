//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record and its derived classification fields.
//! - Provide lifecycle helpers for completion and re-derivation.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `is_urgent` and `quadrant` change only through [`Task::reclassify`].
//! - `completed_at` is present only while `completed` is `true`.

use crate::engine::quadrant::{classify, Quadrant};
use crate::engine::urgency::UrgencyPolicy;
use crate::model::user::UserId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a task.
pub type TaskId = Uuid;

const TITLE_MAX_CHARS: usize = 500;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Validation errors for task write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyTitle,
    TitleTooLong { max_chars: usize },
    QuadrantMismatch {
        quadrant: Quadrant,
        expected: Quadrant,
    },
    CompletedAtWithoutCompletion,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title cannot be empty"),
            Self::TitleTooLong { max_chars } => {
                write!(f, "task title exceeds {max_chars} characters")
            }
            Self::QuadrantMismatch { quadrant, expected } => write!(
                f,
                "quadrant {quadrant} does not match importance/urgency (expected {expected})"
            ),
            Self::CompletedAtWithoutCompletion => {
                write!(f, "completed_at is set on a task that is not completed")
            }
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub is_important: bool,
    /// Derived from `deadline_at` at the last evaluation time.
    pub is_urgent: bool,
    /// Derived from `(is_important, is_urgent)`.
    pub quadrant: Quadrant,
    pub completed: bool,
    /// Unix epoch milliseconds. Set once at creation.
    pub created_at: i64,
    /// Unix epoch milliseconds of the last false -> true completion.
    pub completed_at: Option<i64>,
    /// Unix epoch milliseconds.
    pub deadline_at: Option<i64>,
    /// Absent in single-tenant deployments.
    pub owner_id: Option<UserId>,
}

impl Task {
    /// Creates an open task with derived classification fields.
    ///
    /// # Invariants
    /// - `is_urgent`/`quadrant` are evaluated against `now` with `policy`.
    /// - `completed` starts as `false` and `completed_at` as `None`.
    pub fn new(
        title: impl Into<String>,
        is_important: bool,
        deadline_at: Option<i64>,
        policy: &UrgencyPolicy,
        now: i64,
    ) -> Self {
        let mut task = Self {
            id: Uuid::new_v4(),
            title: normalize_title(&title.into()),
            description: None,
            is_important,
            is_urgent: false,
            quadrant: Quadrant::Q4,
            completed: false,
            created_at: now,
            completed_at: None,
            deadline_at,
            owner_id: None,
        };
        task.reclassify(policy, now);
        task
    }

    /// Re-derives urgency and quadrant for evaluation time `now`.
    ///
    /// Returns `true` when either derived field changed.
    pub fn reclassify(&mut self, policy: &UrgencyPolicy, now: i64) -> bool {
        let urgent = policy.evaluate(self.deadline_at, now).urgent;
        let quadrant = classify(self.is_important, urgent);
        let changed = urgent != self.is_urgent || quadrant != self.quadrant;
        self.is_urgent = urgent;
        self.quadrant = quadrant;
        changed
    }

    /// Marks the task completed at `now`.
    ///
    /// Already completed tasks keep their first `completed_at`.
    pub fn complete(&mut self, now: i64) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.completed_at = Some(now);
    }

    /// Reopens a completed task and clears `completed_at`.
    pub fn reopen(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }

    /// Checks write-path invariants before persistence.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        validate_title(&self.title)?;

        let expected = classify(self.is_important, self.is_urgent);
        if self.quadrant != expected {
            return Err(TaskValidationError::QuadrantMismatch {
                quadrant: self.quadrant,
                expected,
            });
        }

        if !self.completed && self.completed_at.is_some() {
            return Err(TaskValidationError::CompletedAtWithoutCompletion);
        }

        Ok(())
    }
}

/// Collapses internal whitespace runs and trims the title.
pub fn normalize_title(raw: &str) -> String {
    WHITESPACE_RE.replace_all(raw.trim(), " ").into_owned()
}

fn validate_title(title: &str) -> Result<(), TaskValidationError> {
    if title.trim().is_empty() {
        return Err(TaskValidationError::EmptyTitle);
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(TaskValidationError::TitleTooLong {
            max_chars: TITLE_MAX_CHARS,
        });
    }
    Ok(())
}
