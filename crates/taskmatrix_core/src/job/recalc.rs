//! Single recalculation pass over open tasks.
//!
//! # Invariants
//! - Only tasks whose `is_urgent` or `quadrant` changed are written.
//! - All staged writes commit together or not at all.
//! - Title, description, importance, completion and deadline are never written.
//! - Rows the store cannot hand over intact are skipped and counted, never
//!   fatal to the tick.

use crate::db::DbError;
use crate::engine::urgency::UrgencyPolicy;
use crate::repo::task_repo::{ClassificationUpdate, OpenTasks, RepoError, TaskRepository};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Outcome of one successful tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Open tasks loaded and re-evaluated.
    pub inspected: usize,
    /// Tasks whose derived fields were persisted.
    pub updated: usize,
    /// Open rows left out because they failed to load.
    pub skipped: usize,
}

/// Failure of one tick. Nothing was written.
#[derive(Debug)]
pub enum JobError {
    /// The store could not be opened for this tick.
    Open(DbError),
    /// Reading or writing tasks failed.
    Store(RepoError),
}

impl JobError {
    /// Returns whether the failure is lock contention or a busy timeout.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Open(err) => err.is_busy(),
            Self::Store(err) => err.is_transient(),
        }
    }
}

impl Display for JobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(err) => write!(f, "failed to open task store: {err}"),
            Self::Store(err) => write!(f, "task store failure: {err}"),
        }
    }
}

impl Error for JobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<RepoError> for JobError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Recalculation job bound to one repository.
pub struct RecalcJob<R: TaskRepository> {
    repo: R,
    policy: UrgencyPolicy,
}

impl<R: TaskRepository> RecalcJob<R> {
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, UrgencyPolicy::default())
    }

    pub fn with_policy(repo: R, policy: UrgencyPolicy) -> Self {
        Self { repo, policy }
    }

    /// Runs one tick evaluated at `now` (epoch ms).
    ///
    /// # Side effects
    /// - Emits one `recalc_tick` log event with counts or the failure reason.
    pub fn run_tick(&self, now: i64) -> Result<TickSummary, JobError> {
        let started_at = Instant::now();
        match self.tick(now) {
            Ok(summary) => {
                info!(
                    "event=recalc_tick module=job status=ok inspected={} updated={} skipped={} duration_ms={}",
                    summary.inspected,
                    summary.updated,
                    summary.skipped,
                    started_at.elapsed().as_millis()
                );
                Ok(summary)
            }
            Err(err) if err.is_transient() => {
                warn!(
                    "event=recalc_tick module=job status=retry_next_tick duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
            Err(err) => {
                error!(
                    "event=recalc_tick module=job status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn tick(&self, now: i64) -> Result<TickSummary, JobError> {
        let OpenTasks { mut tasks, skipped } = self.repo.list_open_tasks()?;
        let inspected = tasks.len();

        let staged = tasks
            .iter_mut()
            .filter_map(|task| {
                if task.reclassify(&self.policy, now) {
                    Some(ClassificationUpdate::from_task(task))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();

        let updated = self.repo.apply_classification(&staged)?;
        Ok(TickSummary {
            inspected,
            updated,
            skipped,
        })
    }
}
