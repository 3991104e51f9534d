//! Per-handler settings.

use std::time::Duration;

use crate::error::SessionLockError;
use crate::Result;

/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "session_key";

/// Default sleep between lock attempts, in microseconds.
pub const DEFAULT_SPIN_WAIT_MICROS: u64 = 200_000;

/// Lock wait used when no execution time budget is known.
pub const DEFAULT_MAX_WAIT_SECS: f64 = 20.0;

/// Default session lifetime in seconds.
pub const DEFAULT_TTL_SECS: i64 = 1440;

/// Share of the request's execution budget that may be spent waiting for
/// the session lock.
const MAX_WAIT_FACTOR: f64 = 0.7;

/// Settings for one [`SessionHandler`](super::SessionHandler).
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfig {
    /// Prepended to session ids to form store keys. May be empty.
    pub key_prefix: String,
    /// Payload lifetime in seconds; zero or negative stores without expiry.
    pub ttl_seconds: i64,
    /// Sleep between lock attempts.
    pub spin_wait_micros: u64,
    /// Upper bound on time spent waiting for the lock.
    pub max_wait_seconds: f64,
    /// Expiry attached to lock keys, so a crashed holder cannot block a
    /// session forever. `None` leaves lock keys persistent.
    pub lock_ttl_seconds: Option<u64>,
    /// Refuse `write` unless this handler still owns the session lock.
    pub require_lock_for_write: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_PREFIX.to_string(),
            ttl_seconds: DEFAULT_TTL_SECS,
            spin_wait_micros: DEFAULT_SPIN_WAIT_MICROS,
            max_wait_seconds: DEFAULT_MAX_WAIT_SECS,
            lock_ttl_seconds: None,
            require_lock_for_write: false,
        }
    }
}

impl HandlerConfig {
    /// Derive settings from the hosting runtime's limits.
    ///
    /// `session_lifetime` becomes the payload TTL. The lock wait is 70% of
    /// `max_execution_time`, or 20 seconds when there is no such limit.
    pub fn from_runtime(session_lifetime: i64, max_execution_time: Option<f64>) -> Self {
        Self {
            ttl_seconds: session_lifetime,
            max_wait_seconds: max_wait_for(max_execution_time),
            ..Self::default()
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the spin wait interval.
    pub fn with_spin_wait_micros(mut self, micros: u64) -> Self {
        self.spin_wait_micros = micros;
        self
    }

    /// Set the maximum lock wait.
    pub fn with_max_wait(mut self, seconds: f64) -> Self {
        self.max_wait_seconds = seconds;
        self
    }

    /// Set the lock key expiry.
    pub fn with_lock_ttl(mut self, seconds: Option<u64>) -> Self {
        self.lock_ttl_seconds = seconds;
        self
    }

    /// Require a currently owned lock for `write`.
    pub fn strict_writes(mut self) -> Self {
        self.require_lock_for_write = true;
        self
    }

    /// Reject settings the lock protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.spin_wait_micros == 0 {
            return Err(SessionLockError::InvalidConfig(
                "spin wait must be greater than zero".into(),
            ));
        }
        validate_max_wait(self.max_wait_seconds)?;
        if self.lock_ttl_seconds == Some(0) {
            return Err(SessionLockError::InvalidConfig(
                "lock ttl must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Payload expiry, `None` for persistent payloads.
    pub fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.ttl_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn spin_wait(&self) -> Duration {
        Duration::from_micros(self.spin_wait_micros)
    }

    /// Lock wait as a `Duration`. Values `validate` would reject saturate
    /// instead of panicking.
    pub fn max_wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_wait_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn lock_ttl(&self) -> Option<Duration> {
        self.lock_ttl_seconds.map(Duration::from_secs)
    }
}

pub(crate) fn validate_max_wait(seconds: f64) -> Result<()> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        SessionLockError::InvalidConfig(format!(
            "max wait must be a non-negative number of seconds, got {}",
            seconds
        ))
    })?;
    Ok(())
}

fn max_wait_for(max_execution_time: Option<f64>) -> f64 {
    match max_execution_time {
        Some(limit) if limit.is_finite() && limit > 0.0 => limit * MAX_WAIT_FACTOR,
        _ => DEFAULT_MAX_WAIT_SECS,
    }
}
