//! Task use-case service.
//!
//! # Responsibility
//! - Provide the scoped task operations the request layer calls.
//! - Derive urgency/quadrant on create and on importance/deadline edits.
//! - Attach read-only derived fields (`days_until_deadline`, status label).
//!
//! # Invariants
//! - Every operation resolves the caller's [`AccessScope`] first.
//! - Out-of-scope single-task access is `Forbidden`, never `TaskNotFound`.
//! - Derived fields are never accepted as caller input.

use crate::access::scope::AccessScope;
use crate::engine::quadrant::Quadrant;
use crate::engine::timing::{aggregate, summarize, TaskStats, TimingStats};
use crate::engine::urgency::{utc_day_bounds, DeadlineStatus, UrgencyPolicy};
use crate::model::task::{normalize_title, Task, TaskId, TaskValidationError};
use crate::model::user::Caller;
use crate::repo::task_repo::{RepoError, TaskListQuery, TaskOrder, TaskRepository};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

const TASKS_DEFAULT_LIMIT: u32 = 50;
const TASKS_LIMIT_MAX: u32 = 200;
const SEARCH_MIN_CHARS: usize = 2;

/// Service error for task use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Caller input failed validation.
    InvalidInput(String),
    /// Task exists but lies outside the caller's scope.
    Forbidden(TaskId),
    /// No task with this id exists.
    TaskNotFound(TaskId),
    /// Search produced no results for the keyword.
    NoMatches(String),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Forbidden(id) => write!(f, "access to task {id} is forbidden"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::NoMatches(keyword) => write!(f, "no tasks match `{keyword}`"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::TaskNotFound(id),
            RepoError::Validation(err) => Self::InvalidInput(err.to_string()),
            other => Self::Repo(other),
        }
    }
}

impl From<TaskValidationError> for ServiceError {
    fn from(value: TaskValidationError) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

/// Caller input for task creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub is_important: bool,
    /// Unix epoch milliseconds.
    pub deadline_at: Option<i64>,
}

/// Partial update; `None` leaves a field untouched.
///
/// Nested options distinguish "leave as is" from "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub is_important: Option<bool>,
    pub deadline_at: Option<Option<i64>>,
    pub completed: Option<bool>,
}

/// Listing filter for [`TaskService::list_tasks`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub quadrant: Option<Quadrant>,
    pub completed: Option<bool>,
    /// Defaults to 50 and clamps to 200.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Task plus read-only derived display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    pub task: Task,
    pub days_until_deadline: Option<i64>,
    pub status: DeadlineStatus,
}

impl TaskView {
    pub fn status_label(&self) -> &'static str {
        self.status.label()
    }
}

/// Identity of a removed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedTask {
    pub id: TaskId,
    pub title: String,
}

/// Task service facade over repository implementations.
pub struct TaskService<R: TaskRepository> {
    repo: R,
    policy: UrgencyPolicy,
}

impl<R: TaskRepository> TaskService<R> {
    /// Creates a service with the default urgency policy.
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, UrgencyPolicy::default())
    }

    pub fn with_policy(repo: R, policy: UrgencyPolicy) -> Self {
        Self { repo, policy }
    }

    pub fn policy(&self) -> &UrgencyPolicy {
        &self.policy
    }

    /// Creates a task owned by the caller with derived classification.
    pub fn create_task(
        &self,
        caller: &Caller,
        input: NewTask,
        now: i64,
    ) -> Result<TaskView, ServiceError> {
        let mut task = Task::new(
            input.title,
            input.is_important,
            input.deadline_at,
            &self.policy,
            now,
        );
        task.description = normalize_description(input.description);
        task.owner_id = Some(caller.user_id);

        self.repo.create_task(&task)?;
        info!(
            "event=task_create module=service status=ok quadrant={} has_deadline={}",
            task.quadrant,
            task.deadline_at.is_some()
        );
        Ok(self.view(task, now))
    }

    /// Gets one task with derived display fields.
    pub fn get_task(
        &self,
        caller: &Caller,
        id: TaskId,
        now: i64,
    ) -> Result<TaskView, ServiceError> {
        let task = self.fetch_authorized(caller, id)?;
        Ok(self.view(task, now))
    }

    /// Lists tasks visible to the caller.
    pub fn list_tasks(
        &self,
        caller: &Caller,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, ServiceError> {
        let query = TaskListQuery {
            quadrant: filter.quadrant,
            completed: filter.completed,
            limit: Some(normalize_limit(filter.limit)),
            offset: filter.offset,
            ..TaskListQuery::scoped(AccessScope::for_caller(caller))
        };
        Ok(self.repo.list_tasks(&query)?)
    }

    /// Case-insensitive keyword search over title and description.
    pub fn search_tasks(&self, caller: &Caller, keyword: &str) -> Result<Vec<Task>, ServiceError> {
        let keyword = keyword.trim();
        if keyword.chars().count() < SEARCH_MIN_CHARS {
            return Err(ServiceError::InvalidInput(format!(
                "search keyword must contain at least {SEARCH_MIN_CHARS} characters"
            )));
        }

        let hits = self
            .repo
            .search_tasks(AccessScope::for_caller(caller), keyword)?;
        if hits.is_empty() {
            return Err(ServiceError::NoMatches(keyword.to_string()));
        }
        Ok(hits)
    }

    /// Lists tasks in one quadrant given by its string id (`Q1`..`Q4`).
    pub fn list_by_quadrant(
        &self,
        caller: &Caller,
        quadrant: &str,
    ) -> Result<Vec<Task>, ServiceError> {
        let quadrant = Quadrant::parse(quadrant.trim()).ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "unknown quadrant `{quadrant}`; expected Q1|Q2|Q3|Q4"
            ))
        })?;
        let query = TaskListQuery {
            quadrant: Some(quadrant),
            ..TaskListQuery::scoped(AccessScope::for_caller(caller))
        };
        Ok(self.repo.list_tasks(&query)?)
    }

    /// Lists tasks by completion status (`completed` or `pending`).
    pub fn list_by_status(&self, caller: &Caller, status: &str) -> Result<Vec<Task>, ServiceError> {
        let completed = match status.trim() {
            "completed" => true,
            "pending" => false,
            other => {
                return Err(ServiceError::InvalidInput(format!(
                    "unknown status `{other}`; expected completed|pending"
                )))
            }
        };
        let query = TaskListQuery {
            completed: Some(completed),
            ..TaskListQuery::scoped(AccessScope::for_caller(caller))
        };
        Ok(self.repo.list_tasks(&query)?)
    }

    /// Lists open tasks whose deadline falls on the UTC day of `now`.
    pub fn list_due_today(&self, caller: &Caller, now: i64) -> Result<Vec<TaskView>, ServiceError> {
        let query = TaskListQuery {
            completed: Some(false),
            deadline_between: Some(utc_day_bounds(now)),
            order: TaskOrder::DeadlineAsc,
            ..TaskListQuery::scoped(AccessScope::for_caller(caller))
        };
        let tasks = self.repo.list_tasks(&query)?;
        Ok(tasks
            .into_iter()
            .map(|task| TaskView {
                status: DeadlineStatus::DueToday,
                ..self.view(task, now)
            })
            .collect())
    }

    /// Applies a partial update.
    ///
    /// Classification is re-derived when importance or deadline change, or
    /// when a completed task is reopened.
    pub fn update_task(
        &self,
        caller: &Caller,
        id: TaskId,
        patch: TaskPatch,
        now: i64,
    ) -> Result<TaskView, ServiceError> {
        let mut task = self.fetch_authorized(caller, id)?;
        let mut rederive = false;

        if let Some(title) = patch.title {
            task.title = normalize_title(&title);
        }
        if let Some(description) = patch.description {
            task.description = normalize_description(description);
        }
        if let Some(is_important) = patch.is_important {
            task.is_important = is_important;
            rederive = true;
        }
        if let Some(deadline_at) = patch.deadline_at {
            task.deadline_at = deadline_at;
            rederive = true;
        }
        match patch.completed {
            Some(true) => task.complete(now),
            Some(false) if task.completed => {
                task.reopen();
                rederive = true;
            }
            _ => {}
        }

        if rederive {
            task.reclassify(&self.policy, now);
        }

        self.repo.update_task(&task)?;
        Ok(self.view(task, now))
    }

    /// Marks a task completed; repeated calls keep the first timestamp.
    pub fn complete_task(
        &self,
        caller: &Caller,
        id: TaskId,
        now: i64,
    ) -> Result<TaskView, ServiceError> {
        let mut task = self.fetch_authorized(caller, id)?;
        if !task.completed {
            task.complete(now);
            self.repo.update_task(&task)?;
            info!("event=task_complete module=service status=ok");
        }
        Ok(self.view(task, now))
    }

    /// Deletes a task.
    pub fn delete_task(&self, caller: &Caller, id: TaskId) -> Result<DeletedTask, ServiceError> {
        let task = self.fetch_authorized(caller, id)?;
        self.repo.delete_task(task.id)?;
        info!("event=task_delete module=service status=ok");
        Ok(DeletedTask {
            id: task.id,
            title: task.title,
        })
    }

    /// Deadline adherence over the caller's tasks.
    pub fn timing_stats(&self, caller: &Caller, now: i64) -> Result<TimingStats, ServiceError> {
        let tasks = self.all_in_scope(caller)?;
        Ok(aggregate(&tasks, now))
    }

    /// Quadrant and completion counts over the caller's tasks.
    pub fn task_stats(&self, caller: &Caller) -> Result<TaskStats, ServiceError> {
        let tasks = self.all_in_scope(caller)?;
        Ok(summarize(&tasks))
    }

    fn all_in_scope(&self, caller: &Caller) -> Result<Vec<Task>, ServiceError> {
        let query = TaskListQuery::scoped(AccessScope::for_caller(caller));
        Ok(self.repo.list_tasks(&query)?)
    }

    fn fetch_authorized(&self, caller: &Caller, id: TaskId) -> Result<Task, ServiceError> {
        let task = self
            .repo
            .get_task(id)?
            .ok_or(ServiceError::TaskNotFound(id))?;
        if !AccessScope::for_caller(caller).permits(&task) {
            return Err(ServiceError::Forbidden(id));
        }
        Ok(task)
    }

    fn view(&self, task: Task, now: i64) -> TaskView {
        let evaluation = self.policy.evaluate(task.deadline_at, now);
        TaskView {
            task,
            days_until_deadline: evaluation.days_until_deadline,
            status: evaluation.status,
        }
    }
}

fn normalize_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(TASKS_DEFAULT_LIMIT)
        .clamp(1, TASKS_LIMIT_MAX)
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
