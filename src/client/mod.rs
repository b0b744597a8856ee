//! # Client Module
//!
//! The consumer side: a token cache fed from the token endpoint, and a query
//! client that presents the cached token to the database.

pub mod errors;
pub mod query;
pub mod token_cache;
pub mod token_source;

pub use errors::{ClientError, ClientResult};
pub use query::QueryClient;
pub use token_cache::{TokenCache, TokenSnapshot, TokenState};
pub use token_source::{sign_in, sign_up, HttpTokenSource, TokenSource};
