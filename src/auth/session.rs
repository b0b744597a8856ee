//! # Sessions
//!
//! Server-side sessions bound to an opaque cookie, and the resolver that maps
//! an inbound request's cookie to an [`Identity`].
//!
//! ## Invariants
//! - Only the SHA-256 digest of the cookie secret is stored
//! - Sessions stop resolving at `expires_at`
//! - Sign-out removes the session immediately
//! - Resolution never writes: it is safe to call on every request

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::RwLock;
use uuid::Uuid;

use super::crypto::{digest_secret, generate_secret, secrets_match};
use super::errors::{AuthError, AuthResult};
use super::identity::Identity;
use crate::observability::Event;

/// Session record
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,

    pub identity: Identity,

    /// Digest of the cookie secret (raw value only ever sent to the client)
    #[serde(skip_serializing)]
    pub secret_digest: String,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: Duration,

    pub cookie_name: String,

    /// Add `Secure` to the cookie (HTTPS deployments)
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::days(7),
            cookie_name: "session_token".to_string(),
            secure_cookie: false,
        }
    }
}

impl SessionConfig {
    /// `Set-Cookie` value that hands `secret` to the browser
    pub fn issue_cookie(&self, secret: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name,
            secret,
            self.ttl.num_seconds()
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            self.cookie_name
        )
    }
}

/// Credential material carried by an inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCredentials {
    pub session_secret: Option<String>,
}

impl RequestCredentials {
    /// Pull the session cookie out of the request headers
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Self {
        let session_secret = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == cookie_name && !value.is_empty())
            .map(|(_, value)| value.to_string());

        Self { session_secret }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Session storage
pub trait SessionRepository: Send + Sync {
    fn create(&self, session: &Session) -> AuthResult<()>;

    fn find_by_digest(&self, digest: &str) -> AuthResult<Option<Session>>;

    /// Remove a session; returns whether one was removed
    fn delete(&self, id: Uuid) -> AuthResult<bool>;

    /// Drop sessions expired at `now`
    fn delete_expired(&self, now: DateTime<Utc>) -> AuthResult<usize>;
}

/// In-memory session store
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<Vec<Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn create(&self, session: &Session) -> AuthResult<()> {
        let mut sessions = self.sessions.write().map_err(|_| AuthError::poisoned())?;
        sessions.push(session.clone());
        Ok(())
    }

    fn find_by_digest(&self, digest: &str) -> AuthResult<Option<Session>> {
        let sessions = self.sessions.read().map_err(|_| AuthError::poisoned())?;
        Ok(sessions
            .iter()
            .find(|s| secrets_match(&s.secret_digest, digest))
            .cloned())
    }

    fn delete(&self, id: Uuid) -> AuthResult<bool> {
        let mut sessions = self.sessions.write().map_err(|_| AuthError::poisoned())?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        Ok(sessions.len() != before)
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> AuthResult<usize> {
        let mut sessions = self.sessions.write().map_err(|_| AuthError::poisoned())?;
        let before = sessions.len();
        sessions.retain(|s| s.is_live_at(now));
        Ok(before - sessions.len())
    }
}

/// Creates, ends and resolves sessions
pub struct SessionManager<R: SessionRepository> {
    config: SessionConfig,
    repository: R,
}

impl<R: SessionRepository> SessionManager<R> {
    pub fn new(config: SessionConfig, repository: R) -> Self {
        Self { config, repository }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session. Returns the raw cookie secret for the client.
    pub fn create_session(&self, identity: Identity) -> AuthResult<(Session, String)> {
        let secret = generate_secret();
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            identity,
            secret_digest: digest_secret(&secret),
            created_at: now,
            expires_at: now + self.config.ttl,
        };

        self.repository.create(&session)?;
        tracing::info!(
            event = %Event::SessionCreated,
            session_id = %session.id,
            identity = %identity,
            "session created"
        );

        Ok((session, secret))
    }

    /// End the session named by `credentials`. Unknown sessions are ignored.
    pub fn end_session(&self, credentials: &RequestCredentials) -> AuthResult<()> {
        let Some(secret) = credentials.session_secret.as_deref() else {
            return Ok(());
        };

        if let Some(session) = self.repository.find_by_digest(&digest_secret(secret))? {
            self.repository.delete(session.id)?;
            tracing::info!(
                event = %Event::SessionEnded,
                session_id = %session.id,
                identity = %session.identity,
                "session ended"
            );
        }
        Ok(())
    }

    /// Live session for the request, if any
    pub fn resolve_session(&self, credentials: &RequestCredentials) -> AuthResult<Option<Session>> {
        let Some(secret) = credentials.session_secret.as_deref() else {
            return Ok(None);
        };

        let session = self.repository.find_by_digest(&digest_secret(secret))?;
        Ok(session.filter(|s| s.is_live_at(Utc::now())))
    }

    /// Identity behind the request, or `None` when unauthenticated
    pub fn resolve(&self, credentials: &RequestCredentials) -> AuthResult<Option<Identity>> {
        Ok(self.resolve_session(credentials)?.map(|s| s.identity))
    }

    /// Housekeeping: drop expired sessions
    pub fn purge_expired(&self) -> AuthResult<usize> {
        self.repository.delete_expired(Utc::now())
    }
}
