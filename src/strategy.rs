//! Read strategies offered by the query engine.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// How a query protects the backing store.
///
/// | Strategy | Penetration | Breakdown | Blocks caller |
/// |----------|-------------|-----------|---------------|
/// | `PassThrough` | null marker | no | on miss, one store read |
/// | `Mutex` | null marker | lock + retry | while another caller rebuilds |
/// | `LogicalExpire` | no (pre-warmed) | lock + background rebuild | never |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Read through on miss; cache confirmed absences as null markers.
    PassThrough,

    /// Like `PassThrough`, but only one caller per id rebuilds; others wait
    /// and retry.
    #[default]
    Mutex,

    /// Serve whatever is cached; refresh logically expired entries in the
    /// background.
    LogicalExpire,
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::PassThrough => write!(f, "pass_through"),
            CacheStrategy::Mutex => write!(f, "mutex"),
            CacheStrategy::LogicalExpire => write!(f, "logical_expire"),
        }
    }
}

impl FromStr for CacheStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pass_through" | "passthrough" => Ok(CacheStrategy::PassThrough),
            "mutex" => Ok(CacheStrategy::Mutex),
            "logical_expire" | "logical" => Ok(CacheStrategy::LogicalExpire),
            other => Err(Error::ConfigError(format!(
                "Unknown cache strategy: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trips_through_from_str() {
        for strategy in [
            CacheStrategy::PassThrough,
            CacheStrategy::Mutex,
            CacheStrategy::LogicalExpire,
        ] {
            assert_eq!(strategy.to_string().parse::<CacheStrategy>(), Ok(strategy));
        }
    }

    #[test]
    fn test_from_str_accepts_aliases() {
        assert_eq!("Pass-Through".parse(), Ok(CacheStrategy::PassThrough));
        assert_eq!(" logical ".parse(), Ok(CacheStrategy::LogicalExpire));
        assert!(matches!(
            "refresh".parse::<CacheStrategy>(),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_default_is_mutex() {
        assert_eq!(CacheStrategy::default(), CacheStrategy::Mutex);
    }
}
