//! Shared server state

use std::sync::Arc;

use crate::auth::{
    AuthError, AuthResult, AuthService, InMemorySessionRepository, InMemoryUserRepository,
    SigningKey, TokenSigner,
};
use crate::config::AppConfig;
use crate::database::Database;

pub type AppAuthService = AuthService<InMemoryUserRepository, InMemorySessionRepository>;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AppAuthService>,
    pub database: Arc<Database>,
}

impl AppState {
    pub fn new(auth: Arc<AppAuthService>, database: Arc<Database>) -> Self {
        Self { auth, database }
    }

    /// Wire up signer, database and auth service from configuration.
    ///
    /// The database only ever receives the signer's public JWKS.
    pub fn from_config(config: &AppConfig) -> AuthResult<Self> {
        let key = match &config.auth.key_file {
            Some(path) => SigningKey::load_or_create(path)?,
            None => SigningKey::generate()?,
        };
        tracing::info!(kid = %key.kid(), "signing key ready");

        let signer = Arc::new(TokenSigner::new(config.auth.jwt_config(), key));
        let database = Arc::new(Database::new(Arc::new(signer.verifier()?)));
        let auth = Arc::new(AuthService::new(
            InMemoryUserRepository::new(),
            InMemorySessionRepository::new(),
            config.session.session_config(),
            signer,
            config.password.policy(),
        ));

        Ok(Self::new(auth, database))
    }

    pub fn signer(&self) -> &Arc<TokenSigner> {
        self.auth.signer()
    }

    /// Rotate the signing key and hand the new public keys to the database.
    /// Returns the new key id.
    pub fn rotate_keys(&self) -> AuthResult<String> {
        let signer = self.signer();
        let next = SigningKey::generate()?;

        // Stage the next public key before anything is signed with it.
        let mut staged = signer.jwks()?;
        staged.keys.push(next.public_key().to_jwk());
        self.install(&staged)?;

        let kid = signer.rotate(next)?;
        self.install(&signer.jwks()?)?;
        Ok(kid)
    }

    fn install(&self, jwks: &jsonwebtoken::jwk::JwkSet) -> AuthResult<()> {
        self.database
            .install_keys(jwks)
            .map_err(|e| AuthError::KeyMaterial(e.to_string()))
    }
}
