//! Observable events
//!
//! Every security-relevant decision is logged with one of these names in the
//! `event` field, so logs can be filtered without parsing messages.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded
    ConfigLoaded,
    /// Server bound and accepting requests
    Serving,

    // Sessions
    /// Session started at sign-up or sign-in
    SessionCreated,
    /// Session ended at sign-out
    SessionEnded,

    // Tokens
    /// Token minted for a resolved session
    TokenIssued,
    /// Token request without a session
    TokenDeclined,
    /// Token failed verification at the database
    TokenRejected,
    /// Signing key rotated
    KeyRotated,
    /// Verifier key set replaced
    KeysInstalled,

    // Queries
    /// Statement executed under a verified identity
    QueryExecuted,
    /// Write rejected by a row policy check
    PolicyDenied,

    // Client
    /// Client token cache settled
    TokenCacheSettled,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "SERVING",

            Event::SessionCreated => "SESSION_CREATED",
            Event::SessionEnded => "SESSION_ENDED",

            Event::TokenIssued => "TOKEN_ISSUED",
            Event::TokenDeclined => "TOKEN_DECLINED",
            Event::TokenRejected => "TOKEN_REJECTED",
            Event::KeyRotated => "KEY_ROTATED",
            Event::KeysInstalled => "KEYS_INSTALLED",

            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::PolicyDenied => "POLICY_DENIED",

            Event::TokenCacheSettled => "TOKEN_CACHE_SETTLED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
