//! Configuration
//!
//! One JSON file, every field optional. Missing fields take the defaults
//! below; `validate` rejects values that would make tokens or sessions
//! meaningless.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::crypto::PasswordPolicy;
use crate::auth::{JwtConfig, SessionConfig};
use crate::observability::LogFormat;

pub const MAX_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
pub const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;
pub const MAX_LEEWAY_SECS: u64 = 5 * 60;
pub const MAX_ROTATION_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub password: PasswordSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed browser origins; empty means any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_audience")]
    pub audience: String,

    #[serde(default = "default_token_ttl")]
    pub access_token_ttl_secs: i64,

    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,

    #[serde(default = "default_retired_key_limit")]
    pub retired_key_limit: usize,

    /// PKCS#8 key file; generated on first boot if missing. Ephemeral key when unset.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Rotate the signing key on this interval. No rotation when unset.
    #[serde(default)]
    pub rotation_interval_secs: Option<u64>,
}

fn default_issuer() -> String {
    "todo-rls".to_string()
}

fn default_audience() -> String {
    "todo-rls".to_string()
}

fn default_token_ttl() -> i64 {
    15 * 60
}

fn default_leeway() -> u64 {
    5
}

fn default_retired_key_limit() -> usize {
    2
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            audience: default_audience(),
            access_token_ttl_secs: default_token_ttl(),
            leeway_secs: default_leeway(),
            retired_key_limit: default_retired_key_limit(),
            key_file: None,
            rotation_interval_secs: None,
        }
    }
}

impl AuthConfig {
    /// A retired key must stay on the ring until every token it signed has
    /// expired, so `interval * retired_key_limit` has to cover the token
    /// lifetime plus leeway.
    fn check_rotation(&self, interval: u64) -> Result<(), ConfigError> {
        if interval == 0 || interval > MAX_ROTATION_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.rotation_interval_secs must be between 1 and {}",
                MAX_ROTATION_INTERVAL_SECS
            )));
        }
        if self.retired_key_limit == 0 {
            return Err(ConfigError::Invalid(
                "auth.retired_key_limit must be positive when rotation is enabled".to_string(),
            ));
        }

        let retention = interval.saturating_mul(self.retired_key_limit as u64);
        let lifetime = (self.access_token_ttl_secs.max(0) as u64).saturating_add(self.leeway_secs);
        if retention < lifetime {
            return Err(ConfigError::Invalid(format!(
                "auth.rotation_interval_secs * auth.retired_key_limit ({}s) must cover \
                 auth.access_token_ttl_secs + auth.leeway_secs ({}s)",
                retention, lifetime
            )));
        }
        Ok(())
    }

    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig {
            token_ttl: Duration::seconds(self.access_token_ttl_secs),
            leeway_secs: self.leeway_secs,
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            retired_key_limit: self.retired_key_limit,
        }
    }
}

/// Cookie sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default = "default_session_ttl")]
    pub ttl_secs: i64,

    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_cookie_name() -> String {
    "session_token".to_string()
}

fn default_session_ttl() -> i64 {
    7 * 24 * 60 * 60
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_secs: default_session_ttl(),
            secure_cookie: false,
        }
    }
}

impl SessionSettings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ttl: Duration::seconds(self.ttl_secs),
            cookie_name: self.cookie_name.clone(),
            secure_cookie: self.secure_cookie,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordSettings {
    #[serde(default = "default_min_password_length")]
    pub min_length: usize,
}

fn default_min_password_length() -> usize {
    8
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            min_length: default_min_password_length(),
        }
    }
}

impl PasswordSettings {
    pub fn policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            min_length: self.min_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.access_token_ttl_secs <= 0
            || self.auth.access_token_ttl_secs > MAX_TOKEN_TTL_SECS
        {
            return Err(ConfigError::Invalid(format!(
                "auth.access_token_ttl_secs must be between 1 and {}",
                MAX_TOKEN_TTL_SECS
            )));
        }
        if self.auth.leeway_secs > MAX_LEEWAY_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.leeway_secs must be at most {}",
                MAX_LEEWAY_SECS
            )));
        }
        if self.auth.issuer.trim().is_empty() || self.auth.audience.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.issuer and auth.audience must not be empty".to_string(),
            ));
        }
        if let Some(interval) = self.auth.rotation_interval_secs {
            self.auth.check_rotation(interval)?;
        }
        if self.session.ttl_secs <= 0 || self.session.ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "session.ttl_secs must be between 1 and {}",
                MAX_SESSION_TTL_SECS
            )));
        }
        let cookie = &self.session.cookie_name;
        if cookie.is_empty() || cookie.contains(|c: char| c == '=' || c == ';' || c.is_whitespace()) {
            return Err(ConfigError::Invalid(format!(
                "session.cookie_name is not a valid cookie name: {:?}",
                cookie
            )));
        }
        if self.password.min_length == 0 {
            return Err(ConfigError::Invalid(
                "password.min_length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
