//! # Database
//!
//! The row store as seen through a bearer credential. The database holds only
//! public verification keys; it checks the attached token on every statement
//! and evaluates table policies against the identity claim inside it.
//!
//! ## Invariants
//! - No credential, no statement (`CredentialMissing`)
//! - Invalid, expired or unknown-key tokens never reach a table (`CredentialRejected`)
//! - Application filters narrow results; they never widen what policies allow

use std::sync::{Arc, RwLock};

use chrono::Utc;
use jsonwebtoken::jwk::JwkSet;

use super::errors::{QueryError, QueryResult};
use super::policy::{OwnerPolicy, RlsContext};
use super::table::Table;
use super::todos::{validate_task, NewTodo, OwnerFilter, Todo, TodoPatch, TodoQuery};
use crate::auth::{Identity, TokenVerifier};
use crate::observability::Event;

pub struct Database {
    verifier: Arc<TokenVerifier>,
    todos: RwLock<Table<Todo>>,
}

impl Database {
    /// Empty database trusting the keys held by `verifier`
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self {
            verifier,
            todos: RwLock::new(Table::new("todos", OwnerPolicy)),
        }
    }

    /// Replace the trusted verification keys (out-of-band distribution)
    pub fn install_keys(&self, jwks: &JwkSet) -> QueryResult<()> {
        self.verifier
            .install(jwks)
            .map_err(|e| QueryError::Storage(e.to_string()))?;

        tracing::info!(
            event = %Event::KeysInstalled,
            keys = jwks.keys.len(),
            "verification keys installed"
        );
        Ok(())
    }

    /// Open a connection carrying `bearer` as its credential.
    ///
    /// The token is checked here so bad credentials fail fast, and again on
    /// every statement so an expiry mid-connection still fails closed.
    pub fn connect(&self, bearer: Option<&str>) -> QueryResult<Connection<'_>> {
        let bearer = bearer.ok_or(QueryError::CredentialMissing)?;
        let connection = Connection {
            db: self,
            bearer: bearer.to_string(),
        };
        connection.context()?;
        Ok(connection)
    }

    fn authenticate(&self, bearer: &str) -> QueryResult<RlsContext> {
        match self.verifier.verify(bearer) {
            Ok(verified) => Ok(RlsContext::authenticated(verified.identity)),
            Err(err) => {
                tracing::warn!(
                    event = %Event::TokenRejected,
                    reason = %err,
                    "bearer credential rejected"
                );
                Err(QueryError::from(err))
            }
        }
    }
}

/// A database session bound to one bearer credential
pub struct Connection<'a> {
    db: &'a Database,
    bearer: String,
}

impl Connection<'_> {
    fn context(&self) -> QueryResult<RlsContext> {
        self.db.authenticate(&self.bearer)
    }

    /// `auth.user_id()` for this connection's credential
    pub fn current_identity(&self) -> QueryResult<Identity> {
        self.context()?
            .current_identity()
            .ok_or(QueryError::CredentialMissing)
    }

    /// `select * from todos [where ...]`
    pub fn select_todos(&self, query: &TodoQuery) -> QueryResult<Vec<Todo>> {
        let ctx = self.context()?;
        let todos = self.db.todos.read().map_err(|_| QueryError::poisoned())?;

        let rows = todos.select(&ctx, |todo| {
            let owner_ok = match query.owner {
                OwnerFilter::Current => ctx.current_identity() == Some(todo.user_id),
                OwnerFilter::Any => true,
                OwnerFilter::Identity(id) => todo.user_id == id,
            };
            owner_ok && query.is_complete.map_or(true, |c| todo.is_complete == c)
        });

        tracing::debug!(
            event = %Event::QueryExecuted,
            table = "todos",
            op = "select",
            rows = rows.len(),
            identity = ?ctx.current_identity(),
            "statement executed"
        );
        Ok(rows)
    }

    /// `insert into todos (task[, user_id]) values (...)`
    pub fn insert_todo(&self, new: &NewTodo) -> QueryResult<Todo> {
        let ctx = self.context()?;
        let task = validate_task(&new.task)?;
        let owner = new
            .user_id
            .or(ctx.current_identity())
            .ok_or(QueryError::CredentialMissing)?;

        let mut todos = self.db.todos.write().map_err(|_| QueryError::poisoned())?;
        let todo = todos.insert(&ctx, |id| Todo {
            id,
            task,
            is_complete: false,
            inserted_at: Utc::now(),
            user_id: owner,
        })?;

        tracing::debug!(
            event = %Event::QueryExecuted,
            table = "todos",
            op = "insert",
            id = todo.id,
            identity = %owner,
            "statement executed"
        );
        Ok(todo)
    }

    /// `update todos set ... where id = $1`; `Ok(None)` when zero rows matched
    pub fn update_todo(&self, id: i64, patch: &TodoPatch) -> QueryResult<Option<Todo>> {
        let ctx = self.context()?;
        let task = patch.task.as_deref().map(validate_task).transpose()?;

        let mut todos = self.db.todos.write().map_err(|_| QueryError::poisoned())?;
        let updated = todos.update(&ctx, id, |todo| {
            if let Some(task) = task {
                todo.task = task;
            }
            if let Some(done) = patch.is_complete {
                todo.is_complete = done;
            }
        })?;

        tracing::debug!(
            event = %Event::QueryExecuted,
            table = "todos",
            op = "update",
            id,
            rows = usize::from(updated.is_some()),
            "statement executed"
        );
        Ok(updated)
    }

    /// `delete from todos where id = $1`; returns whether a row was removed
    pub fn delete_todo(&self, id: i64) -> QueryResult<bool> {
        let ctx = self.context()?;
        let mut todos = self.db.todos.write().map_err(|_| QueryError::poisoned())?;
        let removed = todos.delete(&ctx, id);

        tracing::debug!(
            event = %Event::QueryExecuted,
            table = "todos",
            op = "delete",
            id,
            rows = usize::from(removed),
            "statement executed"
        );
        Ok(removed)
    }
}
