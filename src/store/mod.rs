//! Key-value store abstraction.
//!
//! The session handler and lock manager only talk to the store through
//! [`KeyValueStore`]. Every method is a single synchronous round trip; a
//! failure is reported as [`SessionLockError::StoreUnavailable`] and never
//! retried.
//!
//! [`SessionLockError::StoreUnavailable`]: crate::SessionLockError::StoreUnavailable

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStore;

use std::time::Duration;

use crate::Result;

/// Operations required from the shared key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Set `key` to `value` only if it is absent, optionally with an expiry.
    ///
    /// Returns `true` if the key was written.
    fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool>;

    /// Fetch the value of `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Unconditionally set `key` with no expiry.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Unconditionally set `key` with an expiry, atomically.
    fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Delete `key`. Returns `true` if a key was removed.
    fn del(&self, key: &str) -> Result<bool>;

    /// Delete `key` only if its current value equals `expected`, as one
    /// indivisible operation. Returns `true` if the delete happened.
    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool>;
}
