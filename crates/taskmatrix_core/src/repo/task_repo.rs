//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and scoped query APIs over canonical `tasks` storage.
//! - Persist recalculated classification fields as one atomic batch.
//!
//! # Invariants
//! - Write paths must call `Task::validate()` before SQL mutations.
//! - Read paths must reject invalid persisted state instead of masking it.
//! - Classification batches touch only `is_urgent` and `quadrant`.
//! - The open-task load for recalculation tolerates stale derived fields and
//!   skips rows it cannot repair, so one bad row never blocks a tick.

use crate::access::scope::AccessScope;
use crate::db::DbError;
use crate::engine::quadrant::{classify, Quadrant};
use crate::model::task::{Task, TaskId, TaskValidationError};
use crate::model::user::InvalidNickname;
use rusqlite::types::Value;
use log::warn;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    description,
    is_important,
    is_urgent,
    quadrant,
    completed,
    created_at,
    completed_at,
    deadline_at,
    owner_id
FROM tasks";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for task/user persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(TaskValidationError),
    InvalidUser(InvalidNickname),
    Db(DbError),
    NotFound(Uuid),
    Conflict(String),
    InvalidData(String),
}

impl RepoError {
    /// Returns whether the failure is transient lock contention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidUser(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidUser(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::Conflict(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<InvalidNickname> for RepoError {
    fn from(value: InvalidNickname) -> Self {
        Self::InvalidUser(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result ordering for task listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskOrder {
    /// Newest first.
    #[default]
    CreatedDesc,
    /// Earliest deadline first; tasks without deadline last.
    DeadlineAsc,
}

/// Query options for listing tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListQuery {
    pub scope: AccessScope,
    pub quadrant: Option<Quadrant>,
    pub completed: Option<bool>,
    /// Inclusive epoch-ms bounds on `deadline_at`.
    pub deadline_between: Option<(i64, i64)>,
    pub order: TaskOrder,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl TaskListQuery {
    /// Unfiltered listing constrained only by `scope`.
    pub fn scoped(scope: AccessScope) -> Self {
        Self {
            scope,
            quadrant: None,
            completed: None,
            deadline_between: None,
            order: TaskOrder::default(),
            limit: None,
            offset: 0,
        }
    }
}

/// Recomputed classification for one open task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationUpdate {
    pub id: TaskId,
    /// Importance the classification was derived from.
    pub is_important: bool,
    pub is_urgent: bool,
    pub quadrant: Quadrant,
}

impl ClassificationUpdate {
    /// Captures the derived fields of an already reclassified task.
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            is_important: task.is_important,
            is_urgent: task.is_urgent,
            quadrant: classify(task.is_important, task.is_urgent),
        }
    }
}

/// Open tasks loaded for recalculation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenTasks {
    /// Decodable open tasks; derived fields may still be stale.
    pub tasks: Vec<Task>,
    /// Rows left out because recalculation cannot repair them.
    pub skipped: usize,
}

/// Repository interface for task persistence.
pub trait TaskRepository {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId>;
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>>;
    /// Case-insensitive substring match over title and description.
    fn search_tasks(&self, scope: AccessScope, keyword: &str) -> RepoResult<Vec<Task>>;
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
    /// Loads every task with `completed = false`, regardless of owner.
    ///
    /// Rows whose `is_urgent`/`quadrant` disagree with their inputs are kept
    /// for repair; other invalid rows are counted in `skipped`.
    fn list_open_tasks(&self) -> RepoResult<OpenTasks>;
    /// Writes all updates in one transaction and returns the rows changed.
    ///
    /// Either every row is written or none is. Rows that were completed,
    /// deleted or had their importance changed since the read are skipped.
    fn apply_classification(&self, updates: &[ClassificationUpdate]) -> RepoResult<usize>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId> {
        task.validate()?;

        self.conn.execute(
            "INSERT INTO tasks (
                uuid,
                title,
                description,
                is_important,
                is_urgent,
                quadrant,
                completed,
                created_at,
                completed_at,
                deadline_at,
                owner_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                task.id.to_string(),
                task.title.as_str(),
                task.description.as_deref(),
                bool_to_int(task.is_important),
                bool_to_int(task.is_urgent),
                task.quadrant.as_str(),
                bool_to_int(task.completed),
                task.created_at,
                task.completed_at,
                task.deadline_at,
                task.owner_id.map(|id| id.to_string()),
            ],
        )?;

        Ok(task.id)
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;

        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                title = ?1,
                description = ?2,
                is_important = ?3,
                is_urgent = ?4,
                quadrant = ?5,
                completed = ?6,
                completed_at = ?7,
                deadline_at = ?8
             WHERE uuid = ?9;",
            params![
                task.title.as_str(),
                task.description.as_deref(),
                bool_to_int(task.is_important),
                bool_to_int(task.is_urgent),
                task.quadrant.as_str(),
                bool_to_int(task.completed),
                task.completed_at,
                task.deadline_at,
                task.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(task.id));
        }

        Ok(())
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE uuid = ?1;"))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }

        Ok(None)
    }

    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        query.scope.push_sql(&mut sql, &mut bind_values);

        if let Some(quadrant) = query.quadrant {
            sql.push_str(" AND quadrant = ?");
            bind_values.push(Value::Text(quadrant.as_str().to_string()));
        }

        if let Some(completed) = query.completed {
            sql.push_str(" AND completed = ?");
            bind_values.push(Value::Integer(bool_to_int(completed)));
        }

        if let Some((start, end)) = query.deadline_between {
            sql.push_str(" AND deadline_at BETWEEN ? AND ?");
            bind_values.push(Value::Integer(start));
            bind_values.push(Value::Integer(end));
        }

        match query.order {
            TaskOrder::CreatedDesc => sql.push_str(" ORDER BY created_at DESC, uuid ASC"),
            TaskOrder::DeadlineAsc => {
                sql.push_str(" ORDER BY deadline_at IS NULL, deadline_at ASC, uuid ASC")
            }
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query(params_from_iter(bind_values))?;
        collect_tasks(rows)
    }

    fn search_tasks(&self, scope: AccessScope, keyword: &str) -> RepoResult<Vec<Task>> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        // SQLite LIKE folds ASCII only, so matching happens on the Rust side.
        let candidates = self.list_tasks(&TaskListQuery::scoped(scope))?;
        Ok(candidates
            .into_iter()
            .filter(|task| {
                task.title.to_lowercase().contains(&needle)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
            .collect())
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE uuid = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn list_open_tasks(&self) -> RepoResult<OpenTasks> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE completed = 0
             ORDER BY created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;

        let mut open = OpenTasks::default();
        while let Some(row) = rows.next()? {
            // A stale quadrant is repairable; every other invariant must hold.
            let decoded = decode_task_row(row).and_then(|task| {
                let mut consistent = task.clone();
                consistent.quadrant = classify(task.is_important, task.is_urgent);
                consistent.validate()?;
                Ok(task)
            });
            match decoded {
                Ok(task) => open.tasks.push(task),
                Err(err @ (RepoError::InvalidData(_) | RepoError::Validation(_))) => {
                    let uuid = row.get::<_, String>("uuid").unwrap_or_default();
                    warn!(
                        "event=task_load module=repo status=skipped uuid={} error={}",
                        uuid, err
                    );
                    open.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(open)
    }

    fn apply_classification(&self, updates: &[ClassificationUpdate]) -> RepoResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE tasks
                 SET
                    is_urgent = ?1,
                    quadrant = ?2
                 WHERE uuid = ?3
                   AND completed = 0
                   AND is_important = ?4;",
            )?;
            for update in updates {
                changed += stmt.execute(params![
                    bool_to_int(update.is_urgent),
                    update.quadrant.as_str(),
                    update.id.to_string(),
                    bool_to_int(update.is_important),
                ])?;
            }
        }
        tx.commit()?;

        Ok(changed)
    }
}

fn collect_tasks(mut rows: rusqlite::Rows<'_>) -> RepoResult<Vec<Task>> {
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(parse_task_row(row)?);
    }
    Ok(tasks)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let task = decode_task_row(row)?;
    task.validate()?;
    Ok(task)
}

/// Decodes column values without checking cross-field invariants.
fn decode_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id = parse_uuid(&row.get::<_, String>("uuid")?, "tasks.uuid")?;

    let quadrant_text: String = row.get("quadrant")?;
    let quadrant = Quadrant::parse(&quadrant_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid quadrant `{quadrant_text}` in tasks.quadrant"))
    })?;

    let owner_id = match row.get::<_, Option<String>>("owner_id")? {
        Some(value) => Some(parse_uuid(&value, "tasks.owner_id")?),
        None => None,
    };

    Ok(Task {
        id,
        title: row.get("title")?,
        description: row.get("description")?,
        is_important: parse_bool(row.get("is_important")?, "tasks.is_important")?,
        is_urgent: parse_bool(row.get("is_urgent")?, "tasks.is_urgent")?,
        quadrant,
        completed: parse_bool(row.get("completed")?, "tasks.completed")?,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
        deadline_at: row.get("deadline_at")?,
        owner_id,
    })
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
