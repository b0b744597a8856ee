//! todo-rls - signed session tokens for a row-level-secured todo store
//!
//! A server-side signer turns a cookie session into a short-lived token; the
//! database verifies that token on every statement and enforces per-row
//! ownership policies from its identity claim. The client side caches the
//! token in memory and attaches it to each query.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod database;
pub mod http_server;
pub mod observability;
