//! Engine configuration.

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TTL;
use crate::observability::DEFAULT_ENTRY_TTL;
use crate::scheduler::DEFAULT_WORKERS;
use crate::strategy::CacheStrategy;
use std::str::FromStr;
use std::time::Duration;

/// Default TTL of null markers (2 minutes).
pub const DEFAULT_NULL_TTL: Duration = Duration::from_secs(2 * 60);

/// Default pause between lock attempts in the mutex strategy.
pub const DEFAULT_LOCK_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Default number of lock attempts before a mutex query gives up.
pub const DEFAULT_LOCK_MAX_ATTEMPTS: u32 = 100;

/// Default logical expiry window for the logical expire strategy.
pub const DEFAULT_LOGICAL_TTL: Duration = Duration::from_secs(20);

/// Tunables for [`QueryEngine`](crate::QueryEngine) and
/// [`CacheService`](crate::CacheService).
///
/// # Environment
///
/// [`CacheConfig::from_env`] starts from the defaults and applies:
///
/// | Variable | Field |
/// |----------|-------|
/// | `CACHE_ENTRY_TTL_SECS` | `entry_ttl` |
/// | `CACHE_NULL_TTL_SECS` | `null_ttl` |
/// | `CACHE_LOCK_TTL_SECS` | `lock_ttl` |
/// | `CACHE_LOCK_RETRY_MS` | `lock_retry_backoff` |
/// | `CACHE_LOCK_MAX_ATTEMPTS` | `lock_max_attempts` |
/// | `CACHE_LOGICAL_TTL_SECS` | `logical_ttl` |
/// | `CACHE_REBUILD_WORKERS` | `rebuild_workers` |
/// | `CACHE_STRATEGY` | `default_strategy` |
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    /// Store TTL of cached entities.
    pub entry_ttl: Duration,
    /// Store TTL of null markers.
    pub null_ttl: Duration,
    /// Store TTL of rebuild locks.
    pub lock_ttl: Duration,
    pub lock_retry_backoff: Duration,
    pub lock_max_attempts: u32,
    /// How long a rebuilt entry counts as fresh.
    pub logical_ttl: Duration,
    pub rebuild_workers: usize,
    pub default_strategy: CacheStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            entry_ttl: DEFAULT_ENTRY_TTL,
            null_ttl: DEFAULT_NULL_TTL,
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_retry_backoff: DEFAULT_LOCK_RETRY_BACKOFF,
            lock_max_attempts: DEFAULT_LOCK_MAX_ATTEMPTS,
            logical_ttl: DEFAULT_LOGICAL_TTL,
            rebuild_workers: DEFAULT_WORKERS,
            default_strategy: CacheStrategy::default(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", name, raw);
            None
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by `CACHE_*` environment variables.
    ///
    /// Unparsable values are logged and ignored.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = CacheConfig::default();

        if let Some(secs) = env_parse::<u64>("CACHE_ENTRY_TTL_SECS") {
            config.entry_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("CACHE_NULL_TTL_SECS") {
            config.null_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("CACHE_LOCK_TTL_SECS") {
            config.lock_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("CACHE_LOCK_RETRY_MS") {
            config.lock_retry_backoff = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse::<u32>("CACHE_LOCK_MAX_ATTEMPTS") {
            config.lock_max_attempts = attempts;
        }
        if let Some(secs) = env_parse::<u64>("CACHE_LOGICAL_TTL_SECS") {
            config.logical_ttl = Duration::from_secs(secs);
        }
        if let Some(workers) = env_parse::<usize>("CACHE_REBUILD_WORKERS") {
            config.rebuild_workers = workers;
        }
        if let Some(strategy) = env_parse::<CacheStrategy>("CACHE_STRATEGY") {
            config.default_strategy = strategy;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let zero_durations = [
            ("entry_ttl", self.entry_ttl),
            ("null_ttl", self.null_ttl),
            ("lock_ttl", self.lock_ttl),
            ("logical_ttl", self.logical_ttl),
        ];
        for (name, value) in zero_durations {
            if value.is_zero() {
                return Err(Error::ConfigError(format!("{} must be positive", name)));
            }
        }
        if self.lock_max_attempts == 0 {
            return Err(Error::ConfigError(
                "lock_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.rebuild_workers == 0 {
            return Err(Error::ConfigError(
                "rebuild_workers must be at least 1".to_string(),
            ));
        }
        if self.null_ttl > self.entry_ttl {
            warn!(
                "null_ttl ({:?}) exceeds entry_ttl ({:?}); absent ids stay cached longer than real ones",
                self.null_ttl, self.entry_ttl
            );
        }
        Ok(())
    }

    pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    pub fn with_null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl = ttl;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_lock_retry(mut self, backoff: Duration, max_attempts: u32) -> Self {
        self.lock_retry_backoff = backoff;
        self.lock_max_attempts = max_attempts;
        self
    }

    pub fn with_logical_ttl(mut self, ttl: Duration) -> Self {
        self.logical_ttl = ttl;
        self
    }

    pub fn with_rebuild_workers(mut self, workers: usize) -> Self {
        self.rebuild_workers = workers;
        self
    }

    pub fn with_default_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }
}
