// Session management module
// Binds opaque session identifiers to users in the key-value backend and
// maintains a per-user index of live sessions for bulk revocation

pub mod manager;

use crate::crypto::CryptoError;
use crate::kv::KvError;
use async_trait::async_trait;
use std::time::Duration;

pub use manager::KvSessionManager;

pub const SESSION_KEY_PREFIX: &str = "session";
pub const KNOWN_SESSIONS_SET_KEY_PREFIX: &str = "known-sessions-set";

/// Default session lifetime
pub const SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Default identifier entropy in bytes; hex encoding doubles the character count
pub const SESSION_ID_LENGTH: usize = 16;

/// Data bound to a session identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: u32,
}

/// Tunables for a session manager instance
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub id_byte_length: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: SESSION_TTL,
            id_byte_length: SESSION_ID_LENGTH,
        }
    }
}

/// Session-layer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session exists for the provided identifier
    NotFound,
    /// The stored session value does not parse as a user identifier
    InvalidData,
    /// Identifier generation failed
    Crypto(CryptoError),
    /// Backend failure from the key-value store, passed through verbatim
    Store(KvError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotFound => write!(f, "There is no session with provided id"),
            SessionError::InvalidData => write!(f, "Session data is invalid"),
            SessionError::Crypto(e) => write!(f, "{}", e),
            SessionError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<KvError> for SessionError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::NoItem => SessionError::NotFound,
            other => SessionError::Store(other),
        }
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        SessionError::Crypto(err)
    }
}

/// Session lifecycle operations
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Mint a unique session identifier bound to the given user
    async fn create_session(&self, data: &SessionData) -> Result<String, SessionError>;

    /// Invalidate a single session
    async fn delete_session(&self, session_id: &str) -> Result<(), SessionError>;

    /// Reset the session's TTL to the configured lifetime
    async fn renewal_session(&self, session_id: &str) -> Result<(), SessionError>;

    /// Resolve a session identifier to its bound data
    async fn get_session_data(&self, session_id: &str) -> Result<SessionData, SessionError>;

    /// Invalidate every session belonging to the given user
    async fn reset_sessions(&self, user_id: u32) -> Result<(), SessionError>;
}

pub(crate) fn session_key(session_id: &str) -> String {
    format!("{}:{}", SESSION_KEY_PREFIX, session_id)
}

pub(crate) fn known_sessions_key(user_id: impl std::fmt::Display) -> String {
    format!("{}:{}", KNOWN_SESSIONS_SET_KEY_PREFIX, user_id)
}
