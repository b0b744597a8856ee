//! Query errors
//!
//! A rejected credential is its own variant so callers can tell it apart from
//! a query that legitimately matched nothing.

use thiserror::Error;

use crate::auth::AuthError;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No bearer credential was attached
    #[error("No credential presented")]
    CredentialMissing,

    /// The bearer credential failed verification
    #[error("Credential rejected: {0}")]
    CredentialRejected(AuthError),

    /// A written row failed the table's policy check
    #[error("New row violates row-level security policy for table \"{0}\"")]
    PolicyViolation(String),

    /// Statement input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Statement matched no visible row
    #[error("No matching row")]
    NotFound,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl QueryError {
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::InvalidInput(_) => 400,
            QueryError::CredentialMissing | QueryError::CredentialRejected(_) => 401,
            QueryError::PolicyViolation(_) => 403,
            QueryError::NotFound => 404,
            QueryError::Storage(_) => 500,
        }
    }

    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::CredentialMissing => "credential_missing",
            QueryError::CredentialRejected(_) => "credential_rejected",
            QueryError::PolicyViolation(_) => "policy_violation",
            QueryError::InvalidInput(_) => "invalid_input",
            QueryError::NotFound => "not_found",
            QueryError::Storage(_) => "storage_error",
        }
    }

    pub(crate) fn poisoned() -> Self {
        QueryError::Storage("Lock poisoned".to_string())
    }
}

impl From<AuthError> for QueryError {
    fn from(err: AuthError) -> Self {
        if err.is_verification_failure() {
            QueryError::CredentialRejected(err)
        } else {
            QueryError::Storage(err.to_string())
        }
    }
}
