//! Background trigger for the recalculation job.
//!
//! # Responsibility
//! - Decide when a tick is due from a daily or interval schedule.
//! - Run due ticks on a dedicated thread with its own store connection.
//!
//! # Invariants
//! - Ticks never overlap; scheduled and manual runs share one lock.
//! - A failed tick is logged and consumes its slot; the thread keeps running.

use crate::db::{open_db_with, StoreOptions};
use crate::engine::urgency::{UrgencyPolicy, DAY_MS};
use crate::job::recalc::{JobError, RecalcJob, TickSummary};
use crate::repo::task_repo::SqliteTaskRepository;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How often the recalculation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Run every N seconds.
    Interval { secs: u64 },
    /// Run once daily at a given hour and minute (UTC).
    Daily { hour: u8, min: u8 },
}

impl Default for Schedule {
    fn default() -> Self {
        Self::Daily { hour: 9, min: 0 }
    }
}

impl Display for Schedule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval { secs } => write!(f, "every {secs}s"),
            Self::Daily { hour, min } => write!(f, "daily at {hour:02}:{min:02} UTC"),
        }
    }
}

impl Schedule {
    /// Returns whether a tick is due at `now` given the last attempt.
    pub fn is_due(&self, last_run: Option<i64>, now: i64) -> bool {
        match *self {
            Self::Interval { secs } => match last_run {
                None => true,
                Some(last) => {
                    let period = i64::try_from(secs)
                        .map_or(i64::MAX, |secs| secs.saturating_mul(1000));
                    now.saturating_sub(last) >= period
                }
            },
            Self::Daily { hour, min } => {
                let offset = (i64::from(hour) * 60 + i64::from(min)) * 60 * 1000;
                let scheduled = now - now.rem_euclid(DAY_MS) + offset;
                match last_run {
                    None => now >= scheduled,
                    Some(last) => last < scheduled && now >= scheduled,
                }
            }
        }
    }
}

/// Static settings for a [`RecalcScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub db_path: PathBuf,
    pub store: StoreOptions,
    pub policy: UrgencyPolicy,
    pub schedule: Schedule,
    /// How often the thread wakes up to check the schedule.
    pub poll_interval: Duration,
}

/// Snapshot of scheduler progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStatus {
    /// Epoch ms of the last attempted tick.
    pub last_run: Option<i64>,
    pub last_summary: Option<TickSummary>,
    pub last_error: Option<String>,
    pub ticks_attempted: u64,
    /// Sum of `updated` over all successful ticks.
    pub tasks_updated: u64,
}

struct Shared {
    config: SchedulerConfig,
    tick_lock: Mutex<()>,
    status: Mutex<SchedulerStatus>,
}

impl Shared {
    fn run_tick(&self, now: i64) -> Result<TickSummary, JobError> {
        let _guard = lock(&self.tick_lock);
        let result = open_db_with(&self.config.db_path, &self.config.store)
            .map_err(JobError::Open)
            .and_then(|conn| {
                RecalcJob::with_policy(SqliteTaskRepository::new(&conn), self.config.policy)
                    .run_tick(now)
            });

        let mut status = lock(&self.status);
        status.last_run = Some(now);
        status.ticks_attempted += 1;
        match &result {
            Ok(summary) => {
                status.last_summary = Some(*summary);
                status.last_error = None;
                status.tasks_updated += summary.updated as u64;
            }
            Err(err) => status.last_error = Some(err.to_string()),
        }
        result
    }
}

/// Handle to the background recalculation thread.
pub struct RecalcScheduler {
    shared: Arc<Shared>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RecalcScheduler {
    /// Spawns the scheduler thread.
    pub fn start(config: SchedulerConfig) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            config,
            tick_lock: Mutex::new(()),
            status: Mutex::new(SchedulerStatus::default()),
        });
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("recalc-scheduler".to_string())
            .spawn(move || {
                info!(
                    "event=scheduler_start module=job status=ok schedule={} poll_ms={}",
                    worker.config.schedule,
                    worker.config.poll_interval.as_millis()
                );
                loop {
                    let now = now_epoch_ms();
                    let last_run = lock(&worker.status).last_run;
                    if worker.config.schedule.is_due(last_run, now) {
                        // Outcome is logged by the job and kept in the status snapshot.
                        let _ = worker.run_tick(now);
                    }

                    match stop_rx.recv_timeout(worker.config.poll_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("event=scheduler_stop module=job status=ok");
            })?;

        Ok(Self {
            shared,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Runs a tick immediately, waiting for any in-flight tick first.
    pub fn run_now(&self) -> Result<TickSummary, JobError> {
        self.shared.run_tick(now_epoch_ms())
    }

    pub fn status(&self) -> SchedulerStatus {
        lock(&self.shared.status).clone()
    }

    /// Signals the thread to stop and waits for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("event=scheduler_stop module=job status=error error_code=thread_panicked");
            }
        }
    }
}

impl Drop for RecalcScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
