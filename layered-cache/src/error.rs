//! Error types for cache operations
//!
//! Most of these never reach callers of the orchestrator: backend failures are
//! absorbed at the orchestrator boundary and degrade into misses or no-ops.
//! The one category that does propagate is [`CacheError::Loader`].

use thiserror::Error;

/// Boxed error produced by a caller-supplied loader
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Distributed store or lock provider cannot be reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Redis driver error (wrapper)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Lock could not be acquired within the wait bound
    #[error("Lock on '{key}' not acquired within {wait_ms}ms")]
    LockTimeout { key: String, wait_ms: u64 },

    /// The caller-supplied loader failed
    #[error("Loader failed: {0}")]
    Loader(#[source] BoxError),

    /// Serialization/Deserialization error at the distributed-tier boundary
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Key could not be built or parsed
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Namespace was never registered
    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether this error means a backend could not be reached
    ///
    /// The orchestrator counts these towards the circuit breaker.
    pub fn is_unavailable(&self) -> bool {
        match self {
            CacheError::BackendUnavailable(_) => true,
            CacheError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            _ => false,
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}
