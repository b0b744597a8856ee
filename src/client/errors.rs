//! Client errors

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx from the token or auth endpoints. `message` is the response
    /// body, or `Request failed with <status>` when the body is empty.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// No token to present; the query was not sent
    #[error("No credential available")]
    NoCredential,

    /// The database refused the presented token
    #[error("Credential rejected by the database")]
    CredentialRejected,

    #[error("Query failed ({status} {code}): {message}")]
    Query {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ClientError {
    pub(crate) fn http(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("Request failed with {}", status)
        } else {
            body.to_string()
        };
        ClientError::Http { status, message }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_message_falls_back_to_status() {
        assert_eq!(
            ClientError::http(502, "  ").to_string(),
            "Request failed with 502"
        );
        assert_eq!(
            ClientError::http(500, "signer unavailable").to_string(),
            "signer unavailable"
        );
    }
}
