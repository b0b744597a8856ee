//! Error bodies shared by every route

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::database::QueryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Rejection type returned by handlers
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn respond(status: u16, error: String, code: &str) -> ApiError {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
}

pub fn auth_error(err: AuthError) -> ApiError {
    if !err.is_client_error() {
        tracing::error!(error = %err, "auth request failed");
    }
    respond(err.status_code(), err.to_string(), err.code())
}

pub fn query_error(err: QueryError) -> ApiError {
    if err.status_code() >= 500 {
        tracing::error!(error = %err, "statement failed");
    }
    respond(err.status_code(), err.to_string(), err.code())
}
