//! # HTTP Server
//!
//! Combines the auth, token and database routers behind tracing and CORS
//! layers, and runs the key-rotation and session housekeeping loops.

use std::time::Duration;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth_routes::auth_routes;
use super::database_routes::database_routes;
use super::state::AppState;
use super::token_routes::token_routes;
use crate::config::ServerConfig;
use crate::observability::Event;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
    rotation_interval: Option<Duration>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            rotation_interval: None,
        }
    }

    /// Rotate the signing key every `interval` while serving
    pub fn with_rotation(mut self, interval: Duration) -> Self {
        self.rotation_interval = Some(interval);
        self
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Build the combined router with all endpoints
    pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
        let auth = auth_routes(state.clone()).merge(token_routes(state.clone()));

        Router::new()
            .route("/health", get(health_handler))
            .nest("/api/auth", auth)
            .nest("/db", database_routes(state))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer(cors_origins)),
            )
    }

    pub fn router(&self) -> Router {
        Self::build_router(self.state.clone(), &self.config.cors_origins)
    }

    /// Bind the configured address and serve until the process stops
    pub async fn start(self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.socket_addr()).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let router = self.router();

        let rotation = self
            .rotation_interval
            .map(|every| spawn_key_rotation(self.state.clone(), every));
        let purge = spawn_session_purge(self.state.clone(), SESSION_PURGE_INTERVAL);

        tracing::info!(
            event = %Event::Serving,
            addr = %listener.local_addr()?,
            rotation_secs = self.rotation_interval.map(|d| d.as_secs()),
            "http server listening"
        );

        let result = axum::serve(listener, router).await;

        purge.abort();
        if let Some(rotation) = rotation {
            rotation.abort();
        }
        result
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|s| s.parse().ok()).collect();

    // Credentialed requests (the session cookie) need explicit lists, not wildcards.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Rotate the signing key on a fixed interval. The first rotation happens
/// one full interval after start.
pub fn spawn_key_rotation(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = state.rotate_keys() {
                tracing::error!(error = %e, "signing key rotation failed");
            }
        }
    })
}

fn spawn_session_purge(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.auth.purge_expired_sessions() {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired sessions purged"),
                Err(e) => tracing::warn!(error = %e, "session purge failed"),
            }
        }
    })
}
