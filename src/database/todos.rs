//! Todo table row types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{QueryError, QueryResult};
use super::policy::Owned;
use crate::auth::Identity;

/// Longest task text accepted
pub const MAX_TASK_LEN: usize = 1000;

/// Row of the `todos` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub task: String,
    pub is_complete: bool,
    pub inserted_at: DateTime<Utc>,
    /// Owner; compared against the token's identity claim
    pub user_id: Identity,
}

impl Owned for Todo {
    fn owner(&self) -> Identity {
        self.user_id
    }
}

/// Insert payload. `user_id` defaults to the caller's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTodo {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Identity>,
}

impl NewTodo {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            user_id: None,
        }
    }
}

/// Update payload; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

/// Application-side owner filter. Policies apply regardless of this.
///
/// On the wire: `current`, `any`, or an identity UUID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OwnerFilter {
    /// `where user_id = auth.user_id()`
    #[default]
    Current,
    /// No application filter; policies alone decide
    Any,
    /// `where user_id = $1`
    Identity(Identity),
}

impl fmt::Display for OwnerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerFilter::Current => f.write_str("current"),
            OwnerFilter::Any => f.write_str("any"),
            OwnerFilter::Identity(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for OwnerFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(OwnerFilter::Current),
            "any" => Ok(OwnerFilter::Any),
            other => other
                .parse::<Identity>()
                .map(OwnerFilter::Identity)
                .map_err(|_| format!("invalid owner filter: {}", other)),
        }
    }
}

impl TryFrom<String> for OwnerFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OwnerFilter> for String {
    fn from(filter: OwnerFilter) -> Self {
        filter.to_string()
    }
}

/// List query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoQuery {
    #[serde(default)]
    pub owner: OwnerFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

/// Trim and bound-check task text
pub fn validate_task(task: &str) -> QueryResult<String> {
    let task = task.trim();
    if task.is_empty() {
        return Err(QueryError::InvalidInput("task must not be empty".to_string()));
    }
    if task.chars().count() > MAX_TASK_LEN {
        return Err(QueryError::InvalidInput(format!(
            "task must be at most {} characters",
            MAX_TASK_LEN
        )));
    }
    Ok(task.to_string())
}
