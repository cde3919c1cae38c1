//! Error types for cache-shield.

use std::fmt;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the query engine, its backends and collaborators.
///
/// Backing-store absence is not an error: engine queries report it as
/// `Ok(None)`. Only [`CacheService::query_by_id`](crate::CacheService::query_by_id)
/// turns it into [`Error::NotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Identifier absent from both cache and backing store.
    NotFound(String),

    /// Missing or invalid argument, rejected before any store access.
    InvalidArgument(String),

    /// Cached value could not be decoded into the requested shape.
    MalformedEntry(String),

    /// Rebuild lock is held by another caller.
    ///
    /// Handled inside the engine (retry or skip); callers never see it.
    LockContention(String),

    /// Cache store could not be reached, or waiting for a rebuild lock ran out
    /// of attempts.
    StoreUnavailable(String),

    /// Backing store (database) failure.
    RepositoryError(String),

    /// Payload could not be encoded for storage.
    SerializationError(String),

    /// Invalid configuration.
    ConfigError(String),

    /// Rebuild scheduler no longer accepts work.
    SchedulerClosed,

    /// Operation exceeded its deadline.
    Timeout(String),
}

impl Error {
    /// Whether repeating the same operation may succeed.
    ///
    /// Used by [`QueryBuilder::with_retry`](crate::QueryBuilder::with_retry).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::Timeout(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::MalformedEntry(msg) => write!(f, "Malformed cache entry: {}", msg),
            Error::LockContention(msg) => write!(f, "Lock contention: {}", msg),
            Error::StoreUnavailable(msg) => write!(f, "Cache store unavailable: {}", msg),
            Error::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Error::SchedulerClosed => write!(f, "Rebuild scheduler is shut down"),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_message() {
        let err = Error::MalformedEntry("cache:shop:1".to_string());
        assert_eq!(err.to_string(), "Malformed cache entry: cache:shop:1");
        assert_eq!(
            Error::SchedulerClosed.to_string(),
            "Rebuild scheduler is shut down"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(Error::StoreUnavailable("down".to_string()).is_retryable());
        assert!(Error::Timeout("slow".to_string()).is_retryable());
        assert!(!Error::MalformedEntry("bad".to_string()).is_retryable());
        assert!(!Error::InvalidArgument("no id".to_string()).is_retryable());
        assert!(!Error::NotFound("1".to_string()).is_retryable());
    }
}
