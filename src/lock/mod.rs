//! Distributed advisory lock over the key-value store.
//!
//! A lock is a key `prefix + session_id + ".lock"` whose value is a
//! [`LockToken`]. Acquisition spins on an atomic set-if-absent with a fixed
//! sleep between attempts; release deletes the key only if it still holds
//! our token, so a holder whose lock expired and was taken over can never
//! remove the new owner's lock.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use session_lock::{LockManager, MemoryStore, SessionId};
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut lock = LockManager::new(store, "sess_");
//! let id = SessionId::new("abc");
//!
//! assert!(lock.acquire(&id, Duration::from_secs(1), Duration::from_millis(10)).unwrap());
//! assert_eq!(lock.lock_key(), Some("sess_abc.lock"));
//! assert!(lock.release().unwrap());
//! ```

mod token;

pub use token::LockToken;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::SessionLockError;
use crate::session::SessionId;
use crate::store::KeyValueStore;
use crate::Result;

/// The lock this manager currently owns.
#[derive(Debug, Clone)]
struct HeldLock {
    key: String,
    token: LockToken,
}

/// Acquires and releases one session lock at a time on behalf of a single
/// handler instance.
pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    lock_ttl: Option<Duration>,
    held: Option<HeldLock>,
}

/// Number of set-if-absent attempts that fit in `max_wait` at one attempt
/// per `spin_wait`, rounded up. Always at least one.
pub fn attempts_for(max_wait: Duration, spin_wait: Duration) -> u64 {
    let spin = spin_wait.as_micros().max(1);
    let attempts = max_wait.as_micros().div_ceil(spin);
    u64::try_from(attempts).unwrap_or(u64::MAX).max(1)
}

impl LockManager {
    /// Create a manager that namespaces lock keys with `prefix`.
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            lock_ttl: None,
            held: None,
        }
    }

    /// Let lock keys expire on their own after `ttl`, in case the holder
    /// dies without releasing.
    pub fn with_lock_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Whether this manager currently owns a lock.
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Token written by the last successful acquisition, if still held.
    pub fn token(&self) -> Option<&LockToken> {
        self.held.as_ref().map(|h| &h.token)
    }

    /// Store key of the held lock.
    pub fn lock_key(&self) -> Option<&str> {
        self.held.as_ref().map(|h| h.key.as_str())
    }

    /// Try to take the lock for `id`, polling every `spin_wait` for at most
    /// `max_wait`.
    ///
    /// Returns `Ok(false)` if the lock stayed busy for the whole budget; no
    /// state is recorded in that case. Store failures abort the loop and
    /// propagate.
    pub fn acquire(&mut self, id: &SessionId, max_wait: Duration, spin_wait: Duration) -> Result<bool> {
        if spin_wait.is_zero() {
            return Err(SessionLockError::InvalidConfig(
                "spin wait must be greater than zero".into(),
            ));
        }

        let key = id.lock_key(&self.prefix);

        if let Some(held) = &self.held {
            if held.key == key {
                return Ok(true);
            }
            debug!("Switching lock from {} to {}", held.key, key);
            self.release()?;
        }

        let token = LockToken::generate();
        let attempts = attempts_for(max_wait, spin_wait);
        let started = Instant::now();

        for attempt in 1..=attempts {
            if self.store.set_nx(&key, token.as_bytes(), self.lock_ttl)? {
                debug!(
                    "Acquired {} on attempt {} after {:?}",
                    key,
                    attempt,
                    started.elapsed()
                );
                self.held = Some(HeldLock { key, token });
                return Ok(true);
            }
            if attempt < attempts {
                std::thread::sleep(spin_wait);
            }
        }

        warn!(
            "Lock {} still busy after {} attempts ({:?})",
            key,
            attempts,
            started.elapsed()
        );
        Ok(false)
    }

    /// Release the held lock, if any.
    ///
    /// Deletes the lock key only if it still carries this manager's token.
    /// Returns whether a key was actually deleted; `Ok(false)` covers both
    /// "nothing held" and "lock already expired or taken over". Local state
    /// is cleared before the store is contacted, so a failed release is
    /// never attempted twice.
    pub fn release(&mut self) -> Result<bool> {
        let Some(held) = self.held.take() else {
            return Ok(false);
        };

        let deleted = self
            .store
            .compare_and_delete(&held.key, held.token.as_bytes())?;

        if deleted {
            debug!("Released {}", held.key);
        } else {
            warn!("Lock {} was no longer ours at release", held.key);
        }
        Ok(deleted)
    }

    /// Check against the store that this manager still owns the lock for `id`.
    pub fn owns(&self, id: &SessionId) -> Result<bool> {
        let Some(held) = &self.held else {
            return Ok(false);
        };
        if held.key != id.lock_key(&self.prefix) {
            return Ok(false);
        }
        let current = self.store.get(&held.key)?;
        Ok(current.as_deref() == Some(held.token.as_bytes()))
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("prefix", &self.prefix)
            .field("lock_ttl", &self.lock_ttl)
            .field("held", &self.held)
            .finish()
    }
}
