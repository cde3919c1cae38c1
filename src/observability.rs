//! Metrics hooks and TTL policy.

use std::collections::HashMap;
use std::time::Duration;

/// Default TTL for cached entries (30 minutes).
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(30 * 60);

/// Receives cache events from the query engine.
///
/// Every method has a no-op default; implement the ones you need.
/// Implementations must be cheap: they run inline on the query path.
pub trait CacheMetrics: Send + Sync {
    /// Entity served from the cache.
    fn record_hit(&self, _key: &str, _duration: Duration) {}

    /// Entity loaded from the backing store and written to the cache.
    fn record_load(&self, _key: &str, _duration: Duration) {}

    /// Entity does not exist.
    fn record_miss(&self, _key: &str, _duration: Duration) {}

    /// Null marker short-circuited a backing-store lookup.
    fn record_null_hit(&self, _key: &str) {}

    /// Logically expired entry served while a rebuild is pending.
    fn record_stale(&self, _key: &str) {}

    /// Rebuild task handed to the scheduler.
    fn record_rebuild_scheduled(&self, _key: &str) {}

    /// Rebuild lock was held by someone else.
    fn record_lock_contention(&self, _key: &str) {}

    /// Query failed.
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics sink that discards everything.
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}

/// Store TTL applied to TTL-governed entries.
#[derive(Clone, Debug, PartialEq)]
pub enum TtlPolicy {
    /// Same TTL for every entity type.
    Fixed(Duration),

    /// TTL chosen by entity prefix, with a fallback.
    PerType {
        default: Duration,
        overrides: HashMap<String, Duration>,
    },
}

impl TtlPolicy {
    /// TTL for entities cached under `prefix`.
    pub fn get_ttl(&self, prefix: &str) -> Duration {
        match self {
            TtlPolicy::Fixed(ttl) => *ttl,
            TtlPolicy::PerType { default, overrides } => {
                overrides.get(prefix).copied().unwrap_or(*default)
            }
        }
    }

    /// Add or replace the TTL for one prefix, turning a fixed policy into a
    /// per-type one.
    pub fn with_override(self, prefix: &str, ttl: Duration) -> Self {
        let (default, mut overrides) = match self {
            TtlPolicy::Fixed(default) => (default, HashMap::new()),
            TtlPolicy::PerType { default, overrides } => (default, overrides),
        };
        overrides.insert(prefix.to_string(), ttl);
        TtlPolicy::PerType { default, overrides }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy::Fixed(DEFAULT_ENTRY_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        assert_eq!(TtlPolicy::default().get_ttl("shop"), DEFAULT_ENTRY_TTL);
    }

    #[test]
    fn test_per_type_policy() {
        let policy = TtlPolicy::Fixed(Duration::from_secs(60))
            .with_override("shop_type", Duration::from_secs(3600));

        assert_eq!(policy.get_ttl("shop"), Duration::from_secs(60));
        assert_eq!(policy.get_ttl("shop_type"), Duration::from_secs(3600));

        let policy = policy.with_override("shop_type", Duration::from_secs(5));
        assert_eq!(policy.get_ttl("shop_type"), Duration::from_secs(5));
    }

    #[test]
    fn test_noop_metrics_accepts_everything() {
        let metrics: Box<dyn CacheMetrics> = Box::new(NoOpMetrics);
        metrics.record_hit("k", Duration::from_millis(1));
        metrics.record_load("k", Duration::from_millis(1));
        metrics.record_miss("k", Duration::from_millis(1));
        metrics.record_null_hit("k");
        metrics.record_stale("k");
        metrics.record_rebuild_scheduled("k");
        metrics.record_lock_contention("k");
        metrics.record_error("k", "boom");
    }
}
