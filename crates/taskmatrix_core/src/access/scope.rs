//! Access scope resolution.
//!
//! # Responsibility
//! - Turn a caller's role and id into the predicate every task query applies.
//! - Render the same predicate as an SQL fragment for repository queries.
//!
//! # Invariants
//! - Admin scope never filters.
//! - User scope only admits tasks whose `owner_id` equals the caller id;
//!   ownerless tasks are invisible to plain users.

use crate::model::task::Task;
use crate::model::user::{Caller, Role, UserId};
use rusqlite::types::Value;

/// Visibility predicate over tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// No restriction.
    All,
    /// Only tasks owned by this user.
    Owner(UserId),
}

impl AccessScope {
    /// Resolves the scope for a caller role and id.
    pub fn resolve(role: Role, caller_id: UserId) -> Self {
        match role {
            Role::Admin => Self::All,
            Role::User => Self::Owner(caller_id),
        }
    }

    /// Resolves the scope for an authenticated caller.
    pub fn for_caller(caller: &Caller) -> Self {
        Self::resolve(caller.role, caller.user_id)
    }

    /// Evaluates the predicate for one task.
    pub fn permits(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Owner(owner_id) => task.owner_id == Some(*owner_id),
        }
    }

    /// Appends the predicate as ` AND ...` with positional binds.
    pub(crate) fn push_sql(&self, sql: &mut String, bind_values: &mut Vec<Value>) {
        if let Self::Owner(owner_id) = self {
            sql.push_str(" AND owner_id = ?");
            bind_values.push(Value::Text(owner_id.to_string()));
        }
    }
}
