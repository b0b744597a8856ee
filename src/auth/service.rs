//! # Auth Service
//!
//! Ties accounts, sessions and the token signer together. HTTP handlers talk
//! to this type only.

use std::sync::Arc;

use super::crypto::{verify_password_unknown_account, PasswordPolicy};
use super::errors::{AuthError, AuthResult};
use super::identity::Identity;
use super::jwt::{SignedToken, TokenSigner};
use super::session::{
    RequestCredentials, Session, SessionConfig, SessionManager, SessionRepository,
};
use super::user::{normalize_email, Credentials, User, UserRepository};
use crate::observability::Event;

/// A newly started session: the account plus the cookie secret to hand out
pub struct SignedIn {
    pub user: User,
    pub session: Session,
    pub secret: String,
}

pub struct AuthService<U: UserRepository, S: SessionRepository> {
    users: U,
    sessions: SessionManager<S>,
    signer: Arc<TokenSigner>,
    password_policy: PasswordPolicy,
}

impl<U: UserRepository, S: SessionRepository> AuthService<U, S> {
    pub fn new(
        users: U,
        session_repo: S,
        session_config: SessionConfig,
        signer: Arc<TokenSigner>,
        password_policy: PasswordPolicy,
    ) -> Self {
        Self {
            users,
            sessions: SessionManager::new(session_config, session_repo),
            signer,
            password_policy,
        }
    }

    pub fn session_config(&self) -> &SessionConfig {
        self.sessions.config()
    }

    pub fn signer(&self) -> &Arc<TokenSigner> {
        &self.signer
    }

    /// Create an account and start a session for it
    pub fn sign_up(&self, credentials: &Credentials) -> AuthResult<SignedIn> {
        let user = User::new(
            &credentials.email,
            &credentials.password,
            &self.password_policy,
        )?;
        self.users.create(&user)?;

        let (session, secret) = self.sessions.create_session(user.id)?;
        Ok(SignedIn {
            user,
            session,
            secret,
        })
    }

    /// Check an email/password pair and start a session
    pub fn sign_in(&self, credentials: &Credentials) -> AuthResult<SignedIn> {
        let email = normalize_email(&credentials.email).map_err(|_| AuthError::InvalidCredentials)?;
        let Some(user) = self.users.find_by_email(&email)? else {
            verify_password_unknown_account(&credentials.password);
            return Err(AuthError::InvalidCredentials);
        };

        if !user.verify_password(&credentials.password)? {
            tracing::warn!(identity = %user.id, "sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let (session, secret) = self.sessions.create_session(user.id)?;
        Ok(SignedIn {
            user,
            session,
            secret,
        })
    }

    pub fn sign_out(&self, credentials: &RequestCredentials) -> AuthResult<()> {
        self.sessions.end_session(credentials)
    }

    pub fn resolve(&self, credentials: &RequestCredentials) -> AuthResult<Option<Identity>> {
        self.sessions.resolve(credentials)
    }

    /// Live session and its account, for session introspection
    pub fn current_session(
        &self,
        credentials: &RequestCredentials,
    ) -> AuthResult<Option<(Session, User)>> {
        let Some(session) = self.sessions.resolve_session(credentials)? else {
            return Ok(None);
        };
        Ok(self
            .users
            .find_by_id(session.identity)?
            .map(|user| (session, user)))
    }

    /// Mint a fresh token for the caller's session.
    ///
    /// `Ok(None)` means the caller has no session; that is not an error.
    pub fn mint_token(&self, credentials: &RequestCredentials) -> AuthResult<Option<SignedToken>> {
        let Some(identity) = self.sessions.resolve(credentials)? else {
            tracing::debug!(event = %Event::TokenDeclined, "no session, no token");
            return Ok(None);
        };

        let email = self.users.find_by_id(identity)?.map(|u| u.email);
        let token = self.signer.issue(identity, email.as_deref())?;

        tracing::info!(
            event = %Event::TokenIssued,
            identity = %identity,
            kid = %token.kid(),
            expires_at = %token.expires_at(),
            "session token issued"
        );
        Ok(Some(token))
    }

    pub fn purge_expired_sessions(&self) -> AuthResult<usize> {
        self.sessions.purge_expired()
    }
}
