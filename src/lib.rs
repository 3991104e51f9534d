//! # session-lock
//!
//! Distributed mutual-exclusion session store.
//!
//! Session payloads live in a shared key-value store (Redis in production)
//! and every request that reads a session first takes a cross-process lock
//! on it, so at most one process works on a given session at a time.
//!
//! ## Features
//!
//! - **Spin lock over SET NX**: bounded, fixed-interval polling
//! - **Safe release**: compare-and-delete on a random per-acquisition token
//! - **Scoped cleanup**: dropping a handler releases its lock
//! - **Store-native expiry**: payload TTLs are enforced by the store
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use session_lock::{HandlerConfig, MemoryStore, SessionHandler, SessionId, SessionLifecycle};
//!
//! fn main() -> session_lock::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let config = HandlerConfig::from_runtime(1440, Some(30.0)).with_prefix("sess_");
//!
//!     let mut handler = SessionHandler::new(store, config)?;
//!     let id = SessionId::new("abc");
//!
//!     let payload = handler.read(&id)?; // takes the lock
//!     assert!(payload.is_empty());
//!     handler.write(&id, b"X=1")?;
//!     handler.close()?; // gives it back
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use error::{Result, SessionLockError};
pub use lock::{LockManager, LockToken};
pub use session::{HandlerConfig, HandlerState, SessionHandler, SessionId, SessionLifecycle};
pub use store::{KeyValueStore, MemoryStore};
#[cfg(feature = "redis-backend")]
pub use store::RedisStore;
