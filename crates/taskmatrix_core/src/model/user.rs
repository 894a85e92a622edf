//! Task owners and request callers.
//!
//! Credentials are verified outside the core; this module only carries the
//! identity and role that scope task visibility.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a user.
pub type UserId = Uuid;

static NICKNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}\p{N}_.\-]{3,50}$").expect("valid nickname regex"));

/// Role that decides task visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Registered task owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique display handle, 3..=50 characters.
    pub nickname: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNickname(pub String);

impl Display for InvalidNickname {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid nickname `{}`; expected 3-50 letters, digits, `_`, `.` or `-`",
            self.0
        )
    }
}

impl Error for InvalidNickname {}

impl User {
    /// Creates a user with a generated stable ID.
    pub fn new(nickname: impl Into<String>, role: Role) -> Result<Self, InvalidNickname> {
        let nickname = nickname.into().trim().to_string();
        if !NICKNAME_RE.is_match(&nickname) {
            return Err(InvalidNickname(nickname));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            nickname,
            role,
        })
    }

    /// Returns the caller identity for this user.
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.id,
            role: self.role,
        }
    }
}

/// Authenticated identity supplied by the auth facility for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }
}
