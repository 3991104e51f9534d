//! Session lifecycle handling.
//!
//! This module provides the session identifier, the handler's lock state
//! machine and the [`SessionHandler`] that guards session payloads with a
//! [`LockManager`](crate::LockManager).

mod config;
mod handler;
mod id;
mod state;

pub use config::{
    HandlerConfig, DEFAULT_MAX_WAIT_SECS, DEFAULT_PREFIX, DEFAULT_SPIN_WAIT_MICROS, DEFAULT_TTL_SECS,
};
pub use handler::SessionHandler;
pub use id::SessionId;
pub use state::HandlerState;

use crate::Result;

/// The operations a web framework drives over one request's session.
///
/// `read` takes the session lock (blocking up to the configured wait) and
/// every exit path must eventually reach `close` or `destroy`, which give
/// it back.
pub trait SessionLifecycle {
    /// Prepare the handler. Always succeeds.
    fn open(&mut self, save_path: &str, session_name: &str) -> Result<bool>;

    /// Lock the session if needed and return its payload, empty if unset.
    fn read(&mut self, id: &SessionId) -> Result<Vec<u8>>;

    /// Store the payload, with the handler's TTL if it has one.
    fn write(&mut self, id: &SessionId, data: &[u8]) -> Result<bool>;

    /// Release the session lock if held.
    fn close(&mut self) -> Result<bool>;

    /// Delete the payload and release the lock.
    fn destroy(&mut self, id: &SessionId) -> Result<bool>;

    /// Expire old sessions. Expiry is left to the store's own TTL.
    fn gc(&mut self, max_lifetime_secs: u64) -> Result<bool>;
}
