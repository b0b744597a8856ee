//! # HTTP Server Module
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/api/auth/*` - Accounts, sessions, token minting, JWKS
//! - `/db/*` - Row-level-secured data access with a bearer token

pub mod auth_routes;
pub mod database_routes;
pub mod errors;
pub mod server;
pub mod state;
pub mod token_routes;

pub use errors::ErrorResponse;
pub use server::HttpServer;
pub use state::AppState;
pub use token_routes::TokenResponse;
