//! # Accounts
//!
//! Minimal account model and repository. Enough to bind an email/password
//! pair to an [`Identity`]; profile management lives elsewhere.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::crypto::{hash_password, verify_password, PasswordPolicy};
use super::errors::{AuthError, AuthResult};
use super::identity::Identity;

/// Account record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Identity,

    /// Normalised email address (unique)
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create an account; the password is validated and hashed here
    pub fn new(email: &str, password: &str, policy: &PasswordPolicy) -> AuthResult<Self> {
        let email = normalize_email(email)?;
        policy.validate(password)?;

        Ok(Self {
            id: Identity::generate(),
            email,
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        })
    }

    pub fn verify_password(&self, password: &str) -> AuthResult<bool> {
        verify_password(password, &self.password_hash)
    }
}

/// Trim and lower-case an email, rejecting anything without a local part and domain
pub fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

/// Sign-up / sign-in request body
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Account storage
pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: Identity) -> AuthResult<Option<User>>;

    fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Insert a new account. Fails with `EmailAlreadyExists` on conflict.
    fn create(&self, user: &User) -> AuthResult<()>;
}

/// In-memory account store
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Identity, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_id(&self, id: Identity) -> AuthResult<Option<User>> {
        let users = self.users.read().map_err(|_| AuthError::poisoned())?;
        Ok(users.get(&id).cloned())
    }

    fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.read().map_err(|_| AuthError::poisoned())?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    fn create(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.write().map_err(|_| AuthError::poisoned())?;
        if users.values().any(|u| u.email == user.email) {
            return Err(AuthError::EmailAlreadyExists);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }
}
