//! Auth HTTP Routes
//!
//! Email/password accounts and the cookie session that the token endpoint
//! resolves.

use axum::{
    extract::{Json, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderName, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{auth_error, ApiError};
use super::state::AppState;
use crate::auth::{Credentials, Identity, RequestCredentials, SignedIn, User};

pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/sign-up", post(sign_up_handler))
        .route("/sign-in", post(sign_in_handler))
        .route("/sign-out", post(sign_out_handler))
        .route("/session", get(session_handler))
        .with_state(state)
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Identity,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub identity: Identity,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

type WithCookie<T> = ([(HeaderName, String); 1], T);

fn credentials(state: &AppState, headers: &HeaderMap) -> RequestCredentials {
    RequestCredentials::from_headers(headers, &state.auth.session_config().cookie_name)
}

fn session_started(state: &AppState, signed_in: &SignedIn) -> WithCookie<Json<UserResponse>> {
    let cookie = state.auth.session_config().issue_cookie(&signed_in.secret);
    (
        [(SET_COOKIE, cookie)],
        Json(UserResponse::from(&signed_in.user)),
    )
}

// ==================
// Handlers
// ==================

async fn sign_up_handler(
    State(state): State<AppState>,
    Json(request): Json<Credentials>,
) -> Result<(StatusCode, WithCookie<Json<UserResponse>>), ApiError> {
    let signed_in = state.auth.sign_up(&request).map_err(auth_error)?;
    Ok((StatusCode::CREATED, session_started(&state, &signed_in)))
}

async fn sign_in_handler(
    State(state): State<AppState>,
    Json(request): Json<Credentials>,
) -> Result<WithCookie<Json<UserResponse>>, ApiError> {
    let signed_in = state.auth.sign_in(&request).map_err(auth_error)?;
    Ok(session_started(&state, &signed_in))
}

/// Ends the session named by the cookie. Always clears the cookie.
async fn sign_out_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, [(HeaderName, String); 1]), ApiError> {
    state
        .auth
        .sign_out(&credentials(&state, &headers))
        .map_err(auth_error)?;

    let cookie = state.auth.session_config().clear_cookie();
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}

/// `null` when unauthenticated
async fn session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Option<SessionResponse>>, ApiError> {
    let current = state
        .auth
        .current_session(&credentials(&state, &headers))
        .map_err(auth_error)?;

    Ok(Json(current.map(|(session, user)| SessionResponse {
        identity: session.identity,
        email: user.email,
        expires_at: session.expires_at,
    })))
}
