//! Lock-guarded session handler.

use std::sync::Arc;

use tracing::{debug, error};

use super::config::validate_max_wait;
use super::{HandlerConfig, HandlerState, SessionId, SessionLifecycle};
use crate::error::SessionLockError;
use crate::lock::LockManager;
use crate::store::KeyValueStore;
use crate::Result;

/// Session handler for one request scope.
///
/// `read` acquires the session lock and keeps it until `close` or
/// `destroy`. Dropping the handler closes it, so the lock is given back on
/// every exit path, including early returns and unwinding panics.
pub struct SessionHandler {
    store: Arc<dyn KeyValueStore>,
    config: HandlerConfig,
    lock: LockManager,
    state: HandlerState,
}

impl SessionHandler {
    /// Create a handler over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, config: HandlerConfig) -> Result<Self> {
        config.validate()?;
        let lock = LockManager::new(Arc::clone(&store), config.key_prefix.clone())
            .with_lock_ttl(config.lock_ttl());
        Ok(Self {
            store,
            config,
            lock,
            state: HandlerState::Unlocked,
        })
    }

    /// Create a handler with default settings.
    pub fn with_defaults(store: Arc<dyn KeyValueStore>) -> Self {
        let config = HandlerConfig::default();
        let lock = LockManager::new(Arc::clone(&store), config.key_prefix.clone());
        Self {
            store,
            config,
            lock,
            state: HandlerState::Unlocked,
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// The lock manager tracking this handler's acquisition.
    pub fn lock(&self) -> &LockManager {
        &self.lock
    }

    /// Override the payload TTL. Zero or negative disables expiry.
    pub fn set_ttl(&mut self, seconds: i64) {
        self.config.ttl_seconds = seconds;
    }

    pub fn ttl(&self) -> i64 {
        self.config.ttl_seconds
    }

    /// Maximum seconds `read` waits for the session lock.
    pub fn max_wait(&self) -> f64 {
        self.config.max_wait_seconds
    }

    pub fn set_max_wait(&mut self, seconds: f64) -> Result<()> {
        validate_max_wait(seconds)?;
        self.config.max_wait_seconds = seconds;
        Ok(())
    }

    fn acquire(&mut self, id: &SessionId) -> Result<()> {
        let max_wait = self.config.max_wait();
        if !self.lock.acquire(id, max_wait, self.config.spin_wait())? {
            return Err(SessionLockError::LockTimeout {
                key: id.lock_key(&self.config.key_prefix),
                waited: max_wait,
            });
        }
        self.state.transition_to(HandlerState::Locked)
    }
}

impl SessionLifecycle for SessionHandler {
    fn open(&mut self, _save_path: &str, _session_name: &str) -> Result<bool> {
        Ok(true)
    }

    fn read(&mut self, id: &SessionId) -> Result<Vec<u8>> {
        if self.state.is_locked() {
            if self.lock.lock_key() != Some(id.lock_key(&self.config.key_prefix).as_str()) {
                debug!("Reading {} under the lock of another session", id);
            }
        } else {
            self.acquire(id)?;
        }

        let key = id.store_key(&self.config.key_prefix);
        Ok(self.store.get(&key)?.unwrap_or_default())
    }

    fn write(&mut self, id: &SessionId, data: &[u8]) -> Result<bool> {
        if self.config.require_lock_for_write && !self.lock.owns(id)? {
            return Err(SessionLockError::LockNotHeld(id.to_string()));
        }

        let key = id.store_key(&self.config.key_prefix);
        match self.config.ttl() {
            Some(ttl) => self.store.set_ex(&key, data, ttl)?,
            None => self.store.set(&key, data)?,
        }
        debug!("Stored {} bytes under {}", data.len(), key);
        Ok(true)
    }

    fn close(&mut self) -> Result<bool> {
        if self.state.is_locked() {
            self.state.transition_to(HandlerState::Unlocked)?;
            self.lock.release()?;
        }
        Ok(true)
    }

    fn destroy(&mut self, id: &SessionId) -> Result<bool> {
        self.store.del(&id.store_key(&self.config.key_prefix))?;
        self.close()
    }

    fn gc(&mut self, _max_lifetime_secs: u64) -> Result<bool> {
        Ok(true)
    }
}

impl Drop for SessionHandler {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to release session lock on drop: {}", e);
        }
    }
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("config", &self.config)
            .field("lock", &self.lock)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn config() -> HandlerConfig {
        HandlerConfig::default()
            .with_prefix("sess_")
            .with_spin_wait_micros(2_000)
            .with_max_wait(0.05)
    }

    fn handler(store: &Arc<MemoryStore>) -> SessionHandler {
        SessionHandler::new(store.clone(), config()).unwrap()
    }

    /// Store whose every call fails, standing in for a dead connection.
    struct DownStore;

    impl KeyValueStore for DownStore {
        fn set_nx(&self, _: &str, _: &[u8], _: Option<Duration>) -> Result<bool> {
            Err(SessionLockError::StoreUnavailable("connection refused".into()))
        }
        fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
            Err(SessionLockError::StoreUnavailable("connection refused".into()))
        }
        fn set(&self, _: &str, _: &[u8]) -> Result<()> {
            Err(SessionLockError::StoreUnavailable("connection refused".into()))
        }
        fn set_ex(&self, _: &str, _: &[u8], _: Duration) -> Result<()> {
            Err(SessionLockError::StoreUnavailable("connection refused".into()))
        }
        fn del(&self, _: &str) -> Result<bool> {
            Err(SessionLockError::StoreUnavailable("connection refused".into()))
        }
        fn compare_and_delete(&self, _: &str, _: &[u8]) -> Result<bool> {
            Err(SessionLockError::StoreUnavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_open_and_gc_are_noops() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);

        assert!(h.open("/tmp", "PHPSESSID").unwrap());
        assert!(h.gc(1440).unwrap());
        assert_eq!(h.state(), HandlerState::Unlocked);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_read_missing_payload_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);

        let data = h.read(&SessionId::new("abc")).unwrap();
        assert!(data.is_empty());
        assert_eq!(h.state(), HandlerState::Locked);
        assert!(store.get("sess_abc.lock").unwrap().is_some());
    }

    #[test]
    fn test_read_when_locked_does_not_reacquire() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);
        let id = SessionId::new("abc");

        h.read(&id).unwrap();
        let token = h.lock().token().cloned();
        h.write(&id, b"X=1").unwrap();

        assert_eq!(h.read(&id).unwrap(), b"X=1");
        assert_eq!(h.lock().token().cloned(), token);
    }

    #[test]
    fn test_read_timeout_is_recoverable() {
        let store = Arc::new(MemoryStore::new());
        store.set("sess_abc.lock", b"other").unwrap();
        let mut h = handler(&store);

        let err = h.read(&SessionId::new("abc")).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, SessionLockError::LockTimeout { ref key, .. } if key == "sess_abc.lock"));
        assert_eq!(h.state(), HandlerState::Unlocked);
        assert!(!h.lock().is_held());
    }

    #[test]
    fn test_write_stores_with_ttl() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);
        h.set_ttl(60);

        h.write(&SessionId::new("abc"), b"X=1").unwrap();
        assert_eq!(store.get("sess_abc").unwrap(), Some(b"X=1".to_vec()));
        assert!(store.ttl("sess_abc").unwrap().is_some());

        store.advance(Duration::from_secs(61)).unwrap();
        assert!(store.get("sess_abc").unwrap().is_none());
    }

    #[test]
    fn test_write_without_ttl_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);
        h.set_ttl(0);
        assert_eq!(h.ttl(), 0);

        h.write(&SessionId::new("abc"), b"X=1").unwrap();
        store.advance(Duration::from_secs(1_000_000)).unwrap();
        assert_eq!(store.get("sess_abc").unwrap(), Some(b"X=1".to_vec()));
    }

    #[test]
    fn test_write_does_not_change_state() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);

        h.write(&SessionId::new("abc"), b"X=1").unwrap();
        assert_eq!(h.state(), HandlerState::Unlocked);
    }

    #[test]
    fn test_strict_write_requires_lock() {
        let store = Arc::new(MemoryStore::new());
        let mut h = SessionHandler::new(store.clone(), config().strict_writes()).unwrap();
        let id = SessionId::new("abc");

        let err = h.write(&id, b"X=1").unwrap_err();
        assert!(matches!(err, SessionLockError::LockNotHeld(_)));
        assert!(store.get("sess_abc").unwrap().is_none());

        h.read(&id).unwrap();
        assert!(h.write(&id, b"X=1").unwrap());

        store.expire("sess_abc.lock").unwrap();
        assert!(h.write(&id, b"X=2").is_err());
        assert_eq!(store.get("sess_abc").unwrap(), Some(b"X=1".to_vec()));
    }

    #[test]
    fn test_close_releases_lock() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);

        h.read(&SessionId::new("abc")).unwrap();
        assert!(h.close().unwrap());
        assert_eq!(h.state(), HandlerState::Unlocked);
        assert!(store.get("sess_abc.lock").unwrap().is_none());

        assert!(h.close().unwrap());
    }

    #[test]
    fn test_destroy_twice() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);
        let id = SessionId::new("abc");

        h.read(&id).unwrap();
        h.write(&id, b"X=1").unwrap();

        assert!(h.destroy(&id).unwrap());
        assert!(h.destroy(&id).unwrap());
        assert!(store.is_empty().unwrap());
        assert_eq!(h.state(), HandlerState::Unlocked);
    }

    #[test]
    fn test_drop_releases_lock() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut h = handler(&store);
            h.read(&SessionId::new("abc")).unwrap();
            assert!(store.get("sess_abc.lock").unwrap().is_some());
        }
        assert!(store.get("sess_abc.lock").unwrap().is_none());
    }

    #[test]
    fn test_drop_after_panic_releases_lock() {
        let store = Arc::new(MemoryStore::new());
        let inner = store.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut h = handler(&inner);
            h.read(&SessionId::new("abc")).unwrap();
            panic!("request failed");
        }));

        assert!(result.is_err());
        assert!(store.get("sess_abc.lock").unwrap().is_none());
    }

    #[test]
    fn test_store_failure_propagates() {
        let mut h = SessionHandler::new(Arc::new(DownStore), config()).unwrap();

        let err = h.read(&SessionId::new("abc")).unwrap_err();
        assert!(matches!(err, SessionLockError::StoreUnavailable(_)));
        assert!(!err.is_recoverable());
        assert!(h.write(&SessionId::new("abc"), b"X=1").is_err());
        assert!(h.destroy(&SessionId::new("abc")).is_err());
    }

    #[test]
    fn test_max_wait_accessors() {
        let store = Arc::new(MemoryStore::new());
        let mut h = SessionHandler::with_defaults(store);

        assert_eq!(h.max_wait(), 20.0);
        h.set_max_wait(3.5).unwrap();
        assert_eq!(h.max_wait(), 3.5);
        assert!(h.set_max_wait(-1.0).is_err());
        assert_eq!(h.max_wait(), 3.5);
    }

    #[test]
    fn test_oversized_max_wait_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);

        let err = h.set_max_wait(1e20).unwrap_err();
        assert!(matches!(err, SessionLockError::InvalidConfig(_)));
        assert_eq!(h.max_wait(), 0.05);
        assert!(h.read(&SessionId::new("abc")).unwrap().is_empty());

        let result = SessionHandler::new(store.clone(), config().with_max_wait(1e20));
        assert!(matches!(result, Err(SessionLockError::InvalidConfig(_))));
    }

    #[test]
    fn test_huge_ttl_does_not_panic() {
        let store = Arc::new(MemoryStore::new());
        let mut h = handler(&store);
        let id = SessionId::new("abc");
        h.set_ttl(i64::MAX);

        assert!(h.write(&id, b"X=1").unwrap());
        assert_eq!(h.read(&id).unwrap(), b"X=1");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryStore::new());
        let result = SessionHandler::new(store, config().with_spin_wait_micros(0));
        assert!(matches!(result, Err(SessionLockError::InvalidConfig(_))));
    }
}
