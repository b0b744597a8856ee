//! # Signing Keys
//!
//! Ed25519 key material for token signing, the key ring that tracks retired
//! keys across rotations, and JWKS export for verifying parties.
//!
//! ## Invariants
//! - The private half never leaves `SigningKey` (no Serialize, redacted Debug)
//! - Only public keys are exported through the JWKS
//! - The ring holds at most `retired_limit` retired keys

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm,
    OctetKeyPairParameters, OctetKeyPairType, PublicKeyUse,
};
use jsonwebtoken::EncodingKey;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use sha2::{Digest, Sha256};

use super::errors::{AuthError, AuthResult};

/// Public half of a signing key, safe to hand to any verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    kid: String,
    bytes: Vec<u8>,
}

impl PublicKey {
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// JWK form (`kty=OKP`, `crv=Ed25519`)
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_algorithm: Some(KeyAlgorithm::EdDSA),
                key_id: Some(self.kid.clone()),
                ..Default::default()
            },
            algorithm: AlgorithmParameters::OctetKeyPair(OctetKeyPairParameters {
                key_type: OctetKeyPairType::OctetKeyPair,
                curve: EllipticCurve::Ed25519,
                x: URL_SAFE_NO_PAD.encode(&self.bytes),
            }),
        }
    }
}

/// Ed25519 signing key
pub struct SigningKey {
    pkcs8: Vec<u8>,
    encoding: EncodingKey,
    public: PublicKey,
    created_at: DateTime<Utc>,
}

impl SigningKey {
    /// Generate a fresh key pair from the system RNG
    pub fn generate() -> AuthResult<Self> {
        let rng = SystemRandom::new();
        let document = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| AuthError::KeyMaterial("key generation failed".to_string()))?;
        Self::from_pkcs8(document.as_ref())
    }

    /// Load from a PKCS#8 v1/v2 DER document
    pub fn from_pkcs8(der: &[u8]) -> AuthResult<Self> {
        let pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der)
            .map_err(|e| AuthError::KeyMaterial(e.to_string()))?;
        let bytes = pair.public_key().as_ref().to_vec();

        Ok(Self {
            pkcs8: der.to_vec(),
            encoding: EncodingKey::from_ed_der(der),
            public: PublicKey {
                kid: key_id(&bytes),
                bytes,
            },
            created_at: Utc::now(),
        })
    }

    /// Load a key file written by [`SigningKey::write_to`]
    pub fn read_from(path: &Path) -> AuthResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| AuthError::KeyMaterial(format!("{}: {}", path.display(), e)))?;
        let der = STANDARD
            .decode(text.trim())
            .map_err(|e| AuthError::KeyMaterial(format!("{}: {}", path.display(), e)))?;
        Self::from_pkcs8(&der)
    }

    /// Write the PKCS#8 document as base64 text, readable by the owner only.
    /// Refuses to overwrite.
    pub fn write_to(&self, path: &Path) -> AuthResult<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .map_err(|e| AuthError::KeyMaterial(format!("{}: {}", path.display(), e)))?;

        writeln!(file, "{}", STANDARD.encode(&self.pkcs8))
            .map_err(|e| AuthError::KeyMaterial(format!("{}: {}", path.display(), e)))
    }

    /// Read the key at `path`, generating and persisting one if the file is missing
    pub fn load_or_create(path: &Path) -> AuthResult<Self> {
        if path.exists() {
            return Self::read_from(path);
        }
        let key = Self::generate()?;
        key.write_to(path)?;
        Ok(key)
    }

    pub fn kid(&self) -> &str {
        self.public.kid()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.public.kid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Key id: truncated SHA-256 of the public key
fn key_id(public: &[u8]) -> String {
    let digest = Sha256::digest(public);
    URL_SAFE_NO_PAD.encode(&digest[..12])
}

/// Current signing key plus recently retired public keys
#[derive(Debug)]
pub struct KeyRing {
    current: SigningKey,
    retired: VecDeque<PublicKey>,
    retired_limit: usize,
}

impl KeyRing {
    pub fn new(current: SigningKey, retired_limit: usize) -> Self {
        Self {
            current,
            retired: VecDeque::new(),
            retired_limit,
        }
    }

    pub fn current(&self) -> &SigningKey {
        &self.current
    }

    /// Promote `next` to current and retire the old key.
    ///
    /// Returns the kids that fell off the ring and will no longer verify.
    pub fn rotate(&mut self, next: SigningKey) -> Vec<String> {
        let previous = std::mem::replace(&mut self.current, next);
        self.retired.push_front(previous.public);

        let mut dropped = Vec::new();
        while self.retired.len() > self.retired_limit {
            if let Some(key) = self.retired.pop_back() {
                dropped.push(key.kid);
            }
        }
        dropped
    }

    /// Every key a verifier should accept, current first
    pub fn public_keys(&self) -> Vec<PublicKey> {
        std::iter::once(self.current.public.clone())
            .chain(self.retired.iter().cloned())
            .collect()
    }

    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: self.public_keys().iter().map(PublicKey::to_jwk).collect(),
        }
    }
}
