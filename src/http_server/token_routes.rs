//! Token HTTP Routes
//!
//! `GET /api/auth/token` mints a short-lived token for the caller's session.
//! An unauthenticated caller is not an error here: the response is still 200
//! with `{"token": null}`.

use axum::{
    extract::State,
    http::{header::CACHE_CONTROL, HeaderMap},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

use super::errors::{auth_error, ApiError};
use super::state::AppState;
use crate::auth::{RequestCredentials, SignedToken};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: Option<String>,
}

pub fn token_routes(state: AppState) -> Router {
    Router::new()
        .route("/token", get(token_handler))
        .route("/jwks", get(jwks_handler))
        .with_state(state)
}

async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let credentials =
        RequestCredentials::from_headers(&headers, &state.auth.session_config().cookie_name);
    let token = state.auth.mint_token(&credentials).map_err(auth_error)?;

    Ok((
        [(CACHE_CONTROL, "no-store")],
        Json(TokenResponse {
            token: token.map(SignedToken::into_string),
        }),
    ))
}

/// Public verification keys
async fn jwks_handler(State(state): State<AppState>) -> Result<Json<JwkSet>, ApiError> {
    state.signer().jwks().map(Json).map_err(auth_error)
}
