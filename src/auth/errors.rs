//! # Auth Errors
//!
//! Error types for the authentication module.

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    // ==================
    // Account Errors
    // ==================

    /// Unknown email or wrong password (generic - don't leak which)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Email already registered
    #[error("Email already registered")]
    EmailAlreadyExists,

    /// Email is empty or not shaped like an address
    #[error("Invalid email address")]
    InvalidEmail,

    /// Password does not meet requirements
    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    // ==================
    // Session Errors
    // ==================

    /// Session not found or expired
    #[error("Session expired or invalid")]
    SessionInvalid,

    // ==================
    // Token Errors
    // ==================

    /// Token is not a well-formed JWT, or its subject is not an identity
    #[error("Malformed token")]
    MalformedToken,

    /// Token has expired
    #[error("Token expired")]
    TokenExpired,

    /// Token signature does not verify
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Issuer or audience does not match this deployment
    #[error("Invalid token claims")]
    InvalidClaims,

    /// Token names a key the verifier does not hold
    #[error("Unknown signing key")]
    UnknownSigningKey,

    // ==================
    // Internal Errors
    // ==================

    /// Password hashing failed
    #[error("Internal error: password hashing failed")]
    HashingFailed,

    /// Key pair could not be generated or loaded
    #[error("Internal error: signing key unavailable: {0}")]
    KeyMaterial(String),

    /// Token generation failed
    #[error("Internal error: token generation failed")]
    TokenGenerationFailed,

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl AuthError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidEmail | AuthError::WeakPassword(_) => 400,

            AuthError::InvalidCredentials
            | AuthError::SessionInvalid
            | AuthError::MalformedToken
            | AuthError::TokenExpired
            | AuthError::InvalidSignature
            | AuthError::InvalidClaims
            | AuthError::UnknownSigningKey => 401,

            AuthError::EmailAlreadyExists => 409,

            AuthError::HashingFailed
            | AuthError::KeyMaterial(_)
            | AuthError::TokenGenerationFailed
            | AuthError::StorageError(_) => 500,
        }
    }

    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::EmailAlreadyExists => "email_taken",
            AuthError::InvalidEmail => "invalid_email",
            AuthError::WeakPassword(_) => "weak_password",
            AuthError::SessionInvalid => "session_invalid",
            AuthError::MalformedToken
            | AuthError::TokenExpired
            | AuthError::InvalidSignature
            | AuthError::InvalidClaims
            | AuthError::UnknownSigningKey => "credential_rejected",
            AuthError::HashingFailed
            | AuthError::KeyMaterial(_)
            | AuthError::TokenGenerationFailed
            | AuthError::StorageError(_) => "internal_error",
        }
    }

    /// Returns whether this error should be logged at warn level
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Whether this error came out of token verification
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken
                | AuthError::TokenExpired
                | AuthError::InvalidSignature
                | AuthError::InvalidClaims
                | AuthError::UnknownSigningKey
        )
    }

    pub(crate) fn poisoned() -> Self {
        AuthError::StorageError("Lock poisoned".to_string())
    }
}
