//! In-process key-value store with TTL support.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::KeyValueStore;
use crate::error::SessionLockError;
use crate::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &[u8], now: Instant, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_vec(),
            // A deadline past what `Instant` can represent never arrives.
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// Thread-safe in-memory store.
///
/// All operations run under one write or read lock, so `set_nx` and
/// `compare_and_delete` are atomic with respect to every other caller
/// sharing the store. Expired entries behave as absent to every read,
/// are overwritten by the next write to their key, and are only dropped
/// from memory by [`MemoryStore::purge_expired`].
///
/// The store keeps its own clock, which tests can push forward with
/// [`MemoryStore::advance`] instead of sleeping through a TTL.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    skew: RwLock<Duration>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            skew: RwLock::new(Duration::ZERO),
        }
    }

    fn now(&self) -> Result<Instant> {
        let skew = self.skew.read().map_err(|_| SessionLockError::LockPoisoned)?;
        Instant::now()
            .checked_add(*skew)
            .ok_or_else(|| SessionLockError::InvalidConfig("store clock overflowed".into()))
    }

    /// Move the store clock forward, expiring anything whose TTL elapses.
    ///
    /// Fails with `InvalidConfig` if the clock would leave the range
    /// `Instant` can represent; the clock is left unchanged.
    pub fn advance(&self, by: Duration) -> Result<()> {
        let mut skew = self
            .skew
            .write()
            .map_err(|_| SessionLockError::LockPoisoned)?;
        let moved = skew
            .checked_add(by)
            .filter(|moved| Instant::now().checked_add(*moved).is_some())
            .ok_or_else(|| {
                SessionLockError::InvalidConfig(format!("cannot advance store clock by {:?}", by))
            })?;
        *skew = moved;
        Ok(())
    }

    /// Force `key` to expire immediately, as if its TTL had run out.
    ///
    /// Returns `false` if the key was not present.
    pub fn expire(&self, key: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionLockError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }

    /// Remaining time to live of `key`, `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.now()?;
        let entries = self
            .entries
            .read()
            .map_err(|_| SessionLockError::LockPoisoned)?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|deadline| deadline - now))
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        let now = self.now()?;
        let entries = self
            .entries
            .read()
            .map_err(|_| SessionLockError::LockPoisoned)?;
        Ok(entries.values().filter(|entry| entry.is_live(now)).count())
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.now()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionLockError::LockPoisoned)?;

        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }

    fn insert(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let now = self.now()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionLockError::LockPoisoned)?;
        entries.insert(key.to_string(), Entry::new(value, now, ttl));
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        let now = self.now()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionLockError::LockPoisoned)?;

        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }

        entries.insert(key.to_string(), Entry::new(value, now, ttl));
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.now()?;
        let entries = self
            .entries
            .read()
            .map_err(|_| SessionLockError::LockPoisoned)?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.insert(key, value, None)
    }

    fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.insert(key, value, Some(ttl))
    }

    fn del(&self, key: &str) -> Result<bool> {
        let now = self.now()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionLockError::LockPoisoned)?;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let now = self.now()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionLockError::LockPoisoned)?;

        match entries.get(key) {
            Some(e) if e.is_live(now) && e.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
