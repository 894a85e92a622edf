//! Timing and quadrant aggregation over task collections.
//!
//! # Invariants
//! - Each task contributes to at most one timing bucket.
//! - Tasks missing the timestamps a bucket needs fall outside all buckets.

use crate::engine::quadrant::Quadrant;
use crate::model::task::Task;
use serde::{Deserialize, Serialize};

/// Deadline-adherence counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingStats {
    pub completed_on_time: u64,
    pub completed_late: u64,
    pub on_plan_pending: u64,
    pub overdue_pending: u64,
}

/// Bucket assigned to a single task by [`timing_bucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingBucket {
    CompletedOnTime,
    CompletedLate,
    OnPlanPending,
    OverduePending,
}

/// Count of tasks per quadrant plus completion split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: u64,
    /// Indexed in [`Quadrant::ALL`] order.
    pub by_quadrant: [u64; 4],
    pub completed: u64,
    pub pending: u64,
}

impl TaskStats {
    pub fn count(&self, quadrant: Quadrant) -> u64 {
        self.by_quadrant[quadrant.index()]
    }
}

/// Returns the timing bucket for one task, if any.
pub fn timing_bucket(task: &Task, now: i64) -> Option<TimingBucket> {
    let deadline = task.deadline_at?;
    if task.completed {
        let completed_at = task.completed_at?;
        return Some(if completed_at <= deadline {
            TimingBucket::CompletedOnTime
        } else {
            TimingBucket::CompletedLate
        });
    }

    Some(if deadline > now {
        TimingBucket::OnPlanPending
    } else {
        TimingBucket::OverduePending
    })
}

/// Partitions `tasks` into the four timing buckets at instant `now`.
pub fn aggregate<'a, I>(tasks: I, now: i64) -> TimingStats
where
    I: IntoIterator<Item = &'a Task>,
{
    tasks
        .into_iter()
        .filter_map(|task| timing_bucket(task, now))
        .fold(TimingStats::default(), |mut stats, bucket| {
            match bucket {
                TimingBucket::CompletedOnTime => stats.completed_on_time += 1,
                TimingBucket::CompletedLate => stats.completed_late += 1,
                TimingBucket::OnPlanPending => stats.on_plan_pending += 1,
                TimingBucket::OverduePending => stats.overdue_pending += 1,
            }
            stats
        })
}

/// Counts tasks by stored quadrant and completion flag.
pub fn summarize<'a, I>(tasks: I) -> TaskStats
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut stats = TaskStats::default();
    for task in tasks {
        stats.total += 1;
        stats.by_quadrant[task.quadrant.index()] += 1;
        if task.completed {
            stats.completed += 1;
        } else {
            stats.pending += 1;
        }
    }
    stats
}
