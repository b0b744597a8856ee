//! # Auth Module
//!
//! Accounts, cookie sessions, and the signed session tokens that carry an
//! identity claim to the row-level-secured database.

pub mod crypto;
pub mod errors;
pub mod identity;
pub mod jwt;
pub mod keys;
pub mod service;
pub mod session;
pub mod user;

pub use errors::{AuthError, AuthResult};
pub use identity::Identity;
pub use jwt::{JwtConfig, SignedToken, TokenClaims, TokenSigner, TokenVerifier, VerifiedToken};
pub use keys::{KeyRing, PublicKey, SigningKey};
pub use service::{AuthService, SignedIn};
pub use session::{
    InMemorySessionRepository, RequestCredentials, Session, SessionConfig, SessionManager,
    SessionRepository,
};
pub use user::{Credentials, InMemoryUserRepository, User, UserRepository};
