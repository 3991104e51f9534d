//! Error types for session-lock.

use std::time::Duration;

use thiserror::Error;

/// Main error type for session-lock operations.
#[derive(Error, Debug)]
pub enum SessionLockError {
    /// The session lock could not be obtained within the wait budget.
    #[error("lock busy: {key} not acquired after {waited:?}")]
    LockTimeout {
        /// Store key of the contended lock.
        key: String,
        /// Wait budget that elapsed.
        waited: Duration,
    },

    /// Communication with the key-value store failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A strict write was attempted without owning the session lock.
    #[error("session lock not held: {0}")]
    LockNotHeld(String),

    /// Invalid handler state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::HandlerState,
        to: crate::session::HandlerState,
    },

    /// Handler configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionLockError {
    /// Whether the caller can degrade gracefully and try again on a later request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for SessionLockError {
    fn from(e: redis::RedisError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

/// Convenience Result type for session-lock operations.
pub type Result<T> = std::result::Result<T, SessionLockError>;
