//! Policy-guarded row storage
//!
//! Every access path goes through the table's [`RowPolicy`]; there is no
//! unguarded accessor.

use std::collections::BTreeMap;

use super::errors::{QueryError, QueryResult};
use super::policy::{RlsContext, RowPolicy};
use crate::observability::Event;

pub struct Table<R> {
    name: String,
    rows: BTreeMap<i64, R>,
    next_id: i64,
    policy: Box<dyn RowPolicy<R>>,
}

impl<R: Clone> Table<R> {
    pub fn new(name: impl Into<String>, policy: impl RowPolicy<R> + 'static) -> Self {
        Self {
            name: name.into(),
            rows: BTreeMap::new(),
            next_id: 1,
            policy: Box::new(policy),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Visible rows matching `filter`, in id order
    pub fn select(&self, ctx: &RlsContext, filter: impl Fn(&R) -> bool) -> Vec<R> {
        self.rows
            .values()
            .filter(|&row| self.policy.using(row, ctx))
            .filter(|&row| filter(row))
            .cloned()
            .collect()
    }

    /// Insert the row built by `build` from the next id
    pub fn insert(&mut self, ctx: &RlsContext, build: impl FnOnce(i64) -> R) -> QueryResult<R> {
        let row = build(self.next_id);
        self.check(&row, ctx)?;

        self.rows.insert(self.next_id, row.clone());
        self.next_id += 1;
        Ok(row)
    }

    /// Apply `change` to a visible row. `Ok(None)` when no visible row has `id`.
    pub fn update(
        &mut self,
        ctx: &RlsContext,
        id: i64,
        change: impl FnOnce(&mut R),
    ) -> QueryResult<Option<R>> {
        let Some(current) = self.rows.get(&id).filter(|&row| self.policy.using(row, ctx)) else {
            return Ok(None);
        };

        let mut next = current.clone();
        change(&mut next);
        self.check(&next, ctx)?;

        self.rows.insert(id, next.clone());
        Ok(Some(next))
    }

    /// Delete a visible row; returns whether one was removed
    pub fn delete(&mut self, ctx: &RlsContext, id: i64) -> bool {
        let visible = self
            .rows
            .get(&id)
            .is_some_and(|row| self.policy.using(row, ctx));
        visible && self.rows.remove(&id).is_some()
    }

    fn check(&self, row: &R, ctx: &RlsContext) -> QueryResult<()> {
        if self.policy.with_check(row, ctx) {
            return Ok(());
        }

        tracing::warn!(
            event = %Event::PolicyDenied,
            table = %self.name,
            policy = %self.policy.name(),
            identity = ?ctx.current_identity(),
            "row rejected by policy check"
        );
        Err(QueryError::PolicyViolation(self.name.clone()))
    }
}
