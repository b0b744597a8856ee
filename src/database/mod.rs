//! # Database
//!
//! An in-process row store that enforces row-level security itself. Callers
//! attach a signed session token; the store verifies it with public keys and
//! exposes its identity claim to per-table policies.

pub mod engine;
pub mod errors;
pub mod policy;
pub mod table;
pub mod todos;

pub use engine::{Connection, Database};
pub use errors::{QueryError, QueryResult};
pub use policy::{OwnerPolicy, Owned, RlsContext, RowPolicy};
pub use table::Table;
pub use todos::{NewTodo, OwnerFilter, Todo, TodoPatch, TodoQuery};
