//! Deadline-driven urgency evaluation.
//!
//! # Invariants
//! - A task is urgent when `deadline_at <= now + window`.
//! - `days_until_deadline` is floored, so any deadline before `now` yields a
//!   negative day count.
//! - Absent deadlines are never urgent.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One day in epoch milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const HOUR_MS: i64 = 60 * 60 * 1000;
const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Human status attached to derived task views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineStatus {
    OnPlan,
    Overdue,
    DueToday,
}

impl DeadlineStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::OnPlan => "on plan",
            Self::Overdue => "overdue",
            Self::DueToday => "due today",
        }
    }
}

impl Display for DeadlineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of evaluating one deadline at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyEvaluation {
    pub urgent: bool,
    pub days_until_deadline: Option<i64>,
    pub status: DeadlineStatus,
}

/// Fixed urgency window ahead of `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyPolicy {
    window_ms: i64,
}

impl Default for UrgencyPolicy {
    fn default() -> Self {
        Self::with_window_hours(DEFAULT_WINDOW_HOURS)
    }
}

impl UrgencyPolicy {
    pub fn with_window_hours(hours: u32) -> Self {
        Self {
            window_ms: i64::from(hours) * HOUR_MS,
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Evaluates `deadline` against the explicit instant `now`.
    pub fn evaluate(&self, deadline: Option<i64>, now: i64) -> UrgencyEvaluation {
        let Some(deadline) = deadline else {
            return UrgencyEvaluation {
                urgent: false,
                days_until_deadline: None,
                status: DeadlineStatus::OnPlan,
            };
        };

        let days = days_until(deadline, now);
        UrgencyEvaluation {
            urgent: deadline <= now.saturating_add(self.window_ms),
            days_until_deadline: Some(days),
            status: if days < 0 {
                DeadlineStatus::Overdue
            } else {
                DeadlineStatus::OnPlan
            },
        }
    }
}

/// Evaluates with the default 24h window.
pub fn evaluate(deadline: Option<i64>, now: i64) -> UrgencyEvaluation {
    UrgencyPolicy::default().evaluate(deadline, now)
}

/// Whole days from `now` until `deadline`, floored.
pub fn days_until(deadline: i64, now: i64) -> i64 {
    deadline.saturating_sub(now).div_euclid(DAY_MS)
}

/// Inclusive `[start, end]` bounds of the UTC day containing `now`.
pub fn utc_day_bounds(now: i64) -> (i64, i64) {
    let start = now - now.rem_euclid(DAY_MS);
    (start, start + DAY_MS - 1)
}
