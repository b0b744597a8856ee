//! # Session Tokens
//!
//! Issuance and verification of the short-lived signed tokens that carry an
//! identity claim to the database.
//!
//! ## Invariants
//! - Stateless: a token is never stored; validity is signature + expiry
//! - Asymmetric: verifiers only ever hold public keys
//! - Fresh per call: every issuance carries its own `jti`
//! - Fail closed: any verification problem is an error, never a default identity

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};
use super::identity::Identity;
use super::keys::{KeyRing, SigningKey};
use crate::observability::Event;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (identity)
    pub sub: String,

    /// Account email, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Issued at (Unix epoch seconds)
    pub iat: i64,

    /// Expiration (Unix epoch seconds)
    pub exp: i64,

    pub aud: String,

    pub iss: String,

    /// Unique token id
    pub jti: String,
}

/// Token configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Token lifetime
    pub token_ttl: Duration,

    /// Clock skew tolerated by verifiers, in seconds
    pub leeway_secs: u64,

    pub issuer: String,

    pub audience: String,

    /// Retired keys still accepted after rotation
    pub retired_key_limit: usize,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::minutes(15),
            leeway_secs: 5,
            issuer: "todo-rls".to_string(),
            audience: "todo-rls".to_string(),
            retired_key_limit: 2,
        }
    }
}

/// A freshly minted token
#[derive(Debug, Clone)]
pub struct SignedToken {
    token: String,
    identity: Identity,
    kid: String,
    expires_at: DateTime<Utc>,
}

impl SignedToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_string(self) -> String {
        self.token
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Outcome of a successful verification
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub identity: Identity,
    pub claims: TokenClaims,
}

/// Holds the signing key ring and mints tokens.
///
/// The private key never leaves this type; verifiers are built from
/// [`TokenSigner::jwks`].
#[derive(Debug)]
pub struct TokenSigner {
    config: JwtConfig,
    keys: RwLock<KeyRing>,
}

impl TokenSigner {
    pub fn new(config: JwtConfig, key: SigningKey) -> Self {
        let ring = KeyRing::new(key, config.retired_key_limit);
        Self {
            config,
            keys: RwLock::new(ring),
        }
    }

    /// Signer with a freshly generated key
    pub fn generate(config: JwtConfig) -> AuthResult<Self> {
        Ok(Self::new(config, SigningKey::generate()?))
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Mint a token for `identity`, valid from now for the configured TTL
    pub fn issue(&self, identity: Identity, email: Option<&str>) -> AuthResult<SignedToken> {
        self.issue_at(identity, email, Utc::now())
    }

    /// Mint a token as if issued at `issued_at`
    pub fn issue_at(
        &self,
        identity: Identity,
        email: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> AuthResult<SignedToken> {
        let expires_at = issued_at
            .checked_add_signed(self.config.token_ttl)
            .ok_or(AuthError::TokenGenerationFailed)?;
        let claims = TokenClaims {
            sub: identity.to_string(),
            email: email.map(str::to_string),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            aud: self.config.audience.clone(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let keys = self.keys.read().map_err(|_| AuthError::poisoned())?;
        let key = keys.current();

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(key.kid().to_string());

        let token = encode(&header, &claims, key.encoding_key())
            .map_err(|_| AuthError::TokenGenerationFailed)?;

        Ok(SignedToken {
            token,
            identity,
            kid: key.kid().to_string(),
            expires_at,
        })
    }

    /// Swap in a new signing key. Returns the new kid.
    pub fn rotate(&self, next: SigningKey) -> AuthResult<String> {
        let mut keys = self.keys.write().map_err(|_| AuthError::poisoned())?;
        let kid = next.kid().to_string();
        let dropped = keys.rotate(next);

        tracing::info!(
            event = %Event::KeyRotated,
            kid = %kid,
            dropped = ?dropped,
            "signing key rotated"
        );
        Ok(kid)
    }

    /// Public verification material for every key still accepted
    pub fn jwks(&self) -> AuthResult<JwkSet> {
        let keys = self.keys.read().map_err(|_| AuthError::poisoned())?;
        Ok(keys.jwks())
    }

    /// Build a standalone verifier from the current JWKS
    pub fn verifier(&self) -> AuthResult<TokenVerifier> {
        TokenVerifier::from_jwks(&self.jwks()?, &self.config)
    }
}

/// Verifies tokens against a set of public keys indexed by kid
pub struct TokenVerifier {
    keys: RwLock<HashMap<String, DecodingKey>>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn from_jwks(jwks: &JwkSet, config: &JwtConfig) -> AuthResult<Self> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[&config.audience]);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation.leeway = config.leeway_secs;

        Ok(Self {
            keys: RwLock::new(index_jwks(jwks)?),
            validation,
        })
    }

    /// Replace the accepted key set
    pub fn install(&self, jwks: &JwkSet) -> AuthResult<()> {
        let next = index_jwks(jwks)?;
        let mut keys = self.keys.write().map_err(|_| AuthError::poisoned())?;
        *keys = next;
        Ok(())
    }

    pub fn key_ids(&self) -> AuthResult<Vec<String>> {
        let keys = self.keys.read().map_err(|_| AuthError::poisoned())?;
        let mut kids: Vec<_> = keys.keys().cloned().collect();
        kids.sort();
        Ok(kids)
    }

    /// Check signature, expiry, issuer and audience; return the identity claim
    pub fn verify(&self, token: &str) -> AuthResult<VerifiedToken> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        if header.alg != Algorithm::EdDSA {
            return Err(AuthError::InvalidSignature);
        }
        let kid = header.kid.ok_or(AuthError::UnknownSigningKey)?;

        let key = {
            let keys = self.keys.read().map_err(|_| AuthError::poisoned())?;
            keys.get(&kid).cloned().ok_or(AuthError::UnknownSigningKey)?
        };

        let data = decode::<TokenClaims>(token, &key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidAudience | ErrorKind::InvalidIssuer => AuthError::InvalidClaims,
                _ => AuthError::MalformedToken,
            }
        })?;

        let identity = data.claims.sub.parse::<Identity>()?;
        Ok(VerifiedToken {
            identity,
            claims: data.claims,
        })
    }
}

fn index_jwks(jwks: &JwkSet) -> AuthResult<HashMap<String, DecodingKey>> {
    let mut keys = HashMap::with_capacity(jwks.keys.len());
    for jwk in &jwks.keys {
        let kid = jwk
            .common
            .key_id
            .clone()
            .ok_or_else(|| AuthError::KeyMaterial("JWK without kid".to_string()))?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::KeyMaterial(e.to_string()))?;
        keys.insert(kid, key);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn create_test_signer() -> TokenSigner {
        TokenSigner::generate(JwtConfig {
            issuer: "test".to_string(),
            audience: "test".to_string(),
            ..JwtConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_token_has_three_segments_and_kid() {
        let signer = create_test_signer();
        let token = signer.issue(Identity::generate(), None).unwrap();

        assert_eq!(token.as_str().split('.').count(), 3);
        let header = decode_header(token.as_str()).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);
        assert_eq!(header.kid.as_deref(), Some(token.kid()));
    }

    #[test]
    fn test_verify_returns_issued_identity() {
        let signer = create_test_signer();
        let identity = Identity::generate();

        let token = signer.issue(identity, Some("a@example.com")).unwrap();
        let verified = signer.verifier().unwrap().verify(token.as_str()).unwrap();

        assert_eq!(verified.identity, identity);
        assert_eq!(verified.claims.email.as_deref(), Some("a@example.com"));
        assert_eq!(verified.claims.exp, token.expires_at().timestamp());
    }

    #[test]
    fn test_each_issue_is_fresh() {
        let signer = create_test_signer();
        let identity = Identity::generate();

        let a = signer.issue(identity, None).unwrap();
        let b = signer.issue(identity, None).unwrap();
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = create_test_signer();
        let issued_at = Utc::now() - Duration::hours(2);
        let token = signer.issue_at(Identity::generate(), None, issued_at).unwrap();

        let result = signer.verifier().unwrap().verify(token.as_str());
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = create_test_signer();
        let token = signer.issue(Identity::generate(), None).unwrap();
        let parts: Vec<&str> = token.as_str().split('.').collect();

        let mut claims: TokenClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims.sub = Identity::generate().to_string();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        let result = signer.verifier().unwrap().verify(&forged);
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_garbage_rejected() {
        let verifier = create_test_signer().verifier().unwrap();
        assert!(matches!(
            verifier.verify("invalid.token.here"),
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(verifier.verify(""), Err(AuthError::MalformedToken)));
    }

    #[test]
    fn test_other_signer_rejected() {
        let signer = create_test_signer();
        let stranger = create_test_signer();
        let token = stranger.issue(Identity::generate(), None).unwrap();

        let result = signer.verifier().unwrap().verify(token.as_str());
        assert!(matches!(result, Err(AuthError::UnknownSigningKey)));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let signer = create_test_signer();
        let token = signer.issue(Identity::generate(), None).unwrap();

        let other_audience = JwtConfig {
            issuer: "test".to_string(),
            audience: "someone-else".to_string(),
            ..JwtConfig::default()
        };
        let verifier = TokenVerifier::from_jwks(&signer.jwks().unwrap(), &other_audience).unwrap();

        assert!(matches!(
            verifier.verify(token.as_str()),
            Err(AuthError::InvalidClaims)
        ));
    }

    #[test]
    fn test_retired_key_verifies_until_dropped() {
        let signer = TokenSigner::generate(JwtConfig {
            retired_key_limit: 1,
            ..JwtConfig::default()
        })
        .unwrap();
        let identity = Identity::generate();
        let old = signer.issue(identity, None).unwrap();

        signer.rotate(SigningKey::generate().unwrap()).unwrap();
        let verifier = signer.verifier().unwrap();
        assert_eq!(verifier.verify(old.as_str()).unwrap().identity, identity);
        let fresh = signer.issue(identity, None).unwrap();
        assert_ne!(fresh.kid(), old.kid());

        let mut both = vec![old.kid().to_string(), fresh.kid().to_string()];
        both.sort();
        assert_eq!(verifier.key_ids().unwrap(), both);

        let newest = signer.rotate(SigningKey::generate().unwrap()).unwrap();
        verifier.install(&signer.jwks().unwrap()).unwrap();
        let mut remaining = vec![fresh.kid().to_string(), newest];
        remaining.sort();
        assert_eq!(verifier.key_ids().unwrap(), remaining);
        assert!(matches!(
            verifier.verify(old.as_str()),
            Err(AuthError::UnknownSigningKey)
        ));
        assert!(verifier.verify(fresh.as_str()).is_ok());
    }

    #[test]
    fn test_unrepresentable_expiry_is_an_error() {
        let signer = TokenSigner::generate(JwtConfig {
            token_ttl: Duration::days(365 * 1_000_000),
            ..JwtConfig::default()
        })
        .unwrap();

        assert!(matches!(
            signer.issue(Identity::generate(), None),
            Err(AuthError::TokenGenerationFailed)
        ));
    }

    #[test]
    fn test_jwks_carries_no_private_material() {
        let signer = create_test_signer();
        let jwks = serde_json::to_value(signer.jwks().unwrap()).unwrap();

        for key in jwks["keys"].as_array().unwrap() {
            assert!(key.get("d").is_none());
        }
    }
}
