//! # Row-Level Security
//!
//! Per-row access policies evaluated inside the database for every statement.
//!
//! ## Invariants
//! - No silent bypass: there is no service role on the token path
//! - Fail closed: a context without an identity sees and writes nothing
//! - `USING` gates which existing rows a statement can see or touch
//! - `WITH CHECK` gates which rows a statement may leave behind

use crate::auth::Identity;

/// Security context of one statement: the verified identity claim, if any
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RlsContext {
    identity: Option<Identity>,
}

impl RlsContext {
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    /// The identity claim policies compare against (`auth.user_id()`)
    pub fn current_identity(&self) -> Option<Identity> {
        self.identity
    }
}

/// Rows that carry an owner-identity column
pub trait Owned {
    fn owner(&self) -> Identity;
}

/// A row policy for table rows of type `R`
pub trait RowPolicy<R>: Send + Sync {
    /// Policy name, for logs and error messages
    fn name(&self) -> &str;

    /// May the statement see (and so read, update or delete) `row`?
    fn using(&self, row: &R, ctx: &RlsContext) -> bool;

    /// May the statement write `row`?
    fn with_check(&self, row: &R, ctx: &RlsContext) -> bool;
}

/// `owner = auth.user_id()` for both visibility and writes
#[derive(Debug, Clone, Default)]
pub struct OwnerPolicy;

impl<R: Owned> RowPolicy<R> for OwnerPolicy {
    fn name(&self) -> &str {
        "owner_only"
    }

    fn using(&self, row: &R, ctx: &RlsContext) -> bool {
        ctx.current_identity() == Some(row.owner())
    }

    fn with_check(&self, row: &R, ctx: &RlsContext) -> bool {
        ctx.current_identity() == Some(row.owner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row(Identity);

    impl Owned for Row {
        fn owner(&self) -> Identity {
            self.0
        }
    }

    #[test]
    fn test_owner_sees_own_row() {
        let me = Identity::generate();
        let ctx = RlsContext::authenticated(me);

        assert!(OwnerPolicy.using(&Row(me), &ctx));
        assert!(OwnerPolicy.with_check(&Row(me), &ctx));
    }

    #[test]
    fn test_other_owner_hidden() {
        let ctx = RlsContext::authenticated(Identity::generate());
        let row = Row(Identity::generate());

        assert!(!OwnerPolicy.using(&row, &ctx));
        assert!(!OwnerPolicy.with_check(&row, &ctx));
    }

    #[test]
    fn test_anonymous_sees_nothing() {
        let ctx = RlsContext::anonymous();
        let row = Row(Identity::generate());

        assert_eq!(ctx.current_identity(), None);
        assert!(!OwnerPolicy.using(&row, &ctx));
        assert!(!OwnerPolicy.with_check(&row, &ctx));
    }
}
