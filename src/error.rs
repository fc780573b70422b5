//! Error types for the cache contract
//!
//! Every backend converts its client-library errors into this taxonomy at the
//! contract boundary; no backend-specific error type crosses the public API.

use thiserror::Error;

/// Unified error type for all cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A value could not be encoded or decoded by either codec path.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// `incr` was called on an existing value that is not an integer.
    #[error("value at key '{key}' is not an integer")]
    NotANumber {
        /// The key holding the offending value
        key: String,
    },

    /// The underlying store could not be reached (connection or timeout failure).
    #[error("cache backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An unknown backend type tag was passed to the factory.
    #[error("unsupported backend type '{0}'")]
    UnsupportedBackend(String),

    /// Catch-all for any other underlying client failure.
    #[error("cache operation failed: {0}")]
    BackendOperation(String),
}

/// Convenience Result alias used throughout the crate.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<sled::Error> for CacheError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => CacheError::BackendUnavailable(io.to_string()),
            other => CacheError::BackendOperation(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_timeout() || err.is_connection_refusal() {
            CacheError::BackendUnavailable(err.to_string())
        } else {
            CacheError::BackendOperation(err.to_string())
        }
    }
}

impl From<memcache::MemcacheError> for CacheError {
    fn from(err: memcache::MemcacheError) -> Self {
        match err {
            memcache::MemcacheError::IOError(io) => CacheError::BackendUnavailable(io.to_string()),
            other => CacheError::BackendOperation(other.to_string()),
        }
    }
}

impl From<cacache::Error> for CacheError {
    fn from(err: cacache::Error) -> Self {
        CacheError::BackendOperation(err.to_string())
    }
}

impl From<heed::Error> for CacheError {
    fn from(err: heed::Error) -> Self {
        match err {
            heed::Error::Io(io) => CacheError::BackendUnavailable(io.to_string()),
            heed::Error::Encoding(e) | heed::Error::Decoding(e) => {
                CacheError::Serialization(e.to_string())
            }
            other => CacheError::BackendOperation(other.to_string()),
        }
    }
}
