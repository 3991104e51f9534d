//! Configuration management for session-lock.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::session::{
    HandlerConfig, DEFAULT_PREFIX, DEFAULT_SPIN_WAIT_MICROS, DEFAULT_TTL_SECS,
};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key-value store connection.
    pub store: StoreSection,
    /// Session handler settings.
    pub session: SessionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Store configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Redis connection URL.
    pub url: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
        }
    }
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Key prefix for payload and lock keys.
    pub prefix: String,
    /// Session lifetime in seconds; payload TTL. Zero disables expiry.
    pub gc_maxlifetime: i64,
    /// Request execution budget in seconds. The lock wait is 70% of it.
    pub max_execution_time: Option<f64>,
    /// Explicit lock wait in seconds, overriding the derived one.
    pub max_wait: Option<f64>,
    /// Sleep between lock attempts in microseconds.
    pub spin_wait_micros: u64,
    /// Expiry for lock keys in seconds.
    pub lock_ttl_secs: Option<u64>,
    /// Refuse writes without an owned lock.
    pub require_lock_for_write: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            gc_maxlifetime: DEFAULT_TTL_SECS,
            max_execution_time: None,
            max_wait: None,
            spin_wait_micros: DEFAULT_SPIN_WAIT_MICROS,
            lock_ttl_secs: None,
            require_lock_for_write: false,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var("SESSION_LOCK_REDIS_URL") {
            self.store.url = url;
        }

        if let Ok(prefix) = std::env::var("SESSION_LOCK_PREFIX") {
            self.session.prefix = prefix;
        }

        if let Ok(ttl) = std::env::var("SESSION_LOCK_TTL") {
            self.session.gc_maxlifetime = parse_env("SESSION_LOCK_TTL", ttl)?;
        }

        if let Ok(limit) = std::env::var("SESSION_LOCK_MAX_EXECUTION_TIME") {
            self.session.max_execution_time =
                Some(parse_env("SESSION_LOCK_MAX_EXECUTION_TIME", limit)?);
        }

        if let Ok(spin) = std::env::var("SESSION_LOCK_SPIN_WAIT") {
            self.session.spin_wait_micros = parse_env("SESSION_LOCK_SPIN_WAIT", spin)?;
        }

        if let Ok(level) = std::env::var("SESSION_LOCK_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref url) = args.redis_url {
            self.store.url = url.clone();
        }

        if let Some(ref prefix) = args.prefix {
            self.session.prefix = prefix.clone();
        }

        if let Some(ttl) = args.ttl {
            self.session.gc_maxlifetime = ttl;
        }

        if let Some(wait) = args.max_wait {
            self.session.max_wait = Some(wait);
        }

        if let Some(spin) = args.spin_wait {
            self.session.spin_wait_micros = spin;
        }

        if args.strict_write {
            self.session.require_lock_for_write = true;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env()?;
        config.apply_args(args);

        Ok(config)
    }

    /// Build and validate the handler settings.
    pub fn to_handler_config(&self) -> Result<HandlerConfig, ConfigError> {
        let session = &self.session;
        let mut handler =
            HandlerConfig::from_runtime(session.gc_maxlifetime, session.max_execution_time)
                .with_prefix(session.prefix.clone())
                .with_spin_wait_micros(session.spin_wait_micros)
                .with_lock_ttl(session.lock_ttl_secs);

        if let Some(wait) = session.max_wait {
            handler = handler.with_max_wait(wait);
        }
        if session.require_lock_for_write {
            handler = handler.strict_writes();
        }

        handler
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(handler)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv(name, value))
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Environment variable with an unparseable value.
    InvalidEnv(&'static str, String),
    /// Settings the handler cannot run with.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidEnv(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
            Self::Invalid(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}
