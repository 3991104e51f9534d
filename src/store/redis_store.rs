//! Redis-backed key-value store.

use std::sync::Mutex;
use std::time::Duration;

use redis::{Client, Connection, Script};
use tracing::debug;

use super::KeyValueStore;
use crate::error::SessionLockError;
use crate::Result;

/// Deletes KEYS[1] only while it still holds ARGV[1].
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Store backed by a single Redis connection.
///
/// The connection is serialized behind a mutex; callers that need
/// parallelism should open one `RedisStore` per worker.
pub struct RedisStore {
    conn: Mutex<Connection>,
    release_script: Script,
}

impl RedisStore {
    /// Connect to the server at `url`, e.g. `redis://127.0.0.1:6379/0`.
    pub fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_connection()?;
        debug!("Connected to redis at {}", url);
        Ok(Self {
            conn: Mutex::new(conn),
            release_script: Script::new(COMPARE_AND_DELETE),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| SessionLockError::LockPoisoned)?;
        Ok(f(&mut *conn)?)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl KeyValueStore for RedisStore {
    fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        self.with_conn(|conn| {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value).arg("NX");
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(px_millis(ttl));
            }
            let reply: Option<String> = cmd.query(conn)?;
            Ok(reply.is_some())
        })
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.with_conn(|conn| redis::cmd("SET").arg(key).arg(value).query(conn))
    }

    fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.with_conn(|conn| {
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl.as_secs().max(1))
                .arg(value)
                .query(conn)
        })
    }

    fn del(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed: i64 = redis::cmd("DEL").arg(key).query(conn)?;
            Ok(removed > 0)
        })
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        self.with_conn(|conn| {
            let removed: i64 = self.release_script.key(key).arg(expected).invoke(conn)?;
            Ok(removed > 0)
        })
    }
}

/// `PX` argument for `ttl`: at least one millisecond, saturating at `u64::MAX`.
fn px_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis().max(1)).unwrap_or(u64::MAX)
}
