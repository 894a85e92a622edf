//! Core domain logic for taskmatrix.
//! This crate is the single source of truth for classification invariants.

pub mod access;
pub mod config;
pub mod db;
pub mod engine;
pub mod job;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use access::scope::AccessScope;
pub use config::{AppConfig, ConfigError};
pub use engine::quadrant::{classify, Quadrant};
pub use engine::timing::{aggregate, summarize, TaskStats, TimingBucket, TimingStats};
pub use engine::urgency::{evaluate, DeadlineStatus, UrgencyEvaluation, UrgencyPolicy};
pub use job::recalc::{JobError, RecalcJob, TickSummary};
pub use job::scheduler::{now_epoch_ms, RecalcScheduler, Schedule, SchedulerConfig};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::task::{Task, TaskId, TaskValidationError};
pub use model::user::{Caller, Role, User, UserId};
pub use repo::task_repo::{
    ClassificationUpdate, OpenTasks, RepoError, RepoResult, SqliteTaskRepository,
    TaskListQuery, TaskRepository,
};
pub use repo::user_repo::{SqliteUserRepository, UserRepository};
pub use service::task_service::{
    DeletedTask, NewTask, ServiceError, TaskFilter, TaskPatch, TaskService, TaskView,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
