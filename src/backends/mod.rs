//! Cache Backend Implementations
//!
//! This module contains the five storage backends behind the uniform
//! [`CacheBackend`](crate::traits::CacheBackend) contract, and the factory
//! that constructs them from a type tag plus configuration.
//!
//! # Available Backends
//!
//! | Type tag | Engine | TTL introspection | Key enumeration |
//! |---|---|---|---|
//! | `embedded-document` | sled document tree | exact (this layer) | in-process scan |
//! | `remote-kv` | Redis | exact (server-side) | server SCAN |
//! | `disk` | cacache | `-1` for present keys | index listing |
//! | `distributed-memory` | Memcached | `-1` for present keys | none (empty + warning) |
//! | `embedded-btree` | LMDB | exact (this layer) | cursor walk |
//!
//! # Usage
//!
//! ```rust,no_run
//! use multi_backend_cache::{create_cache_backend, BackendConfig};
//!
//! # async fn example() -> Result<(), multi_backend_cache::CacheError> {
//! let config = BackendConfig::default().with_directory("./cache-data");
//! let cache = create_cache_backend("embedded-btree", &config).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::config::BackendConfig;
use crate::error::{CacheError, CacheResult};
use crate::traits::CacheBackend;

pub mod btree_cache;
pub mod disk_cache;
pub mod document_cache;
pub mod memcached_cache;
pub mod redis_cache;

// Re-export backend types
pub use btree_cache::BtreeCache;
pub use disk_cache::DiskCache;
pub use document_cache::DocumentCache;
pub use memcached_cache::MemcachedCache;
pub use redis_cache::RedisCache;

/// The five supported backend type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Embedded document store (sled)
    EmbeddedDocument,
    /// Remote in-memory key-value server (Redis)
    RemoteKv,
    /// Disk-resident cache (cacache)
    Disk,
    /// Distributed memory-cache protocol (Memcached)
    DistributedMemory,
    /// Embedded memory-mapped B+tree (LMDB)
    EmbeddedBtree,
}

impl BackendType {
    /// The tag accepted by [`create_cache_backend`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BackendType::EmbeddedDocument => "embedded-document",
            BackendType::RemoteKv => "remote-kv",
            BackendType::Disk => "disk",
            BackendType::DistributedMemory => "distributed-memory",
            BackendType::EmbeddedBtree => "embedded-btree",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded-document" => Ok(BackendType::EmbeddedDocument),
            "remote-kv" => Ok(BackendType::RemoteKv),
            "disk" => Ok(BackendType::Disk),
            "distributed-memory" => Ok(BackendType::DistributedMemory),
            "embedded-btree" => Ok(BackendType::EmbeddedBtree),
            other => Err(CacheError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// Construct the configured backend from a type tag and configuration.
///
/// Unknown tags fail here, at construction time, never lazily.
///
/// # Errors
///
/// [`CacheError::UnsupportedBackend`] for an unknown tag;
/// [`CacheError::BackendUnavailable`] / [`CacheError::BackendOperation`] if
/// the underlying store cannot be opened or reached.
pub async fn create_cache_backend(
    backend_type: &str,
    config: &BackendConfig,
) -> CacheResult<Arc<dyn CacheBackend>> {
    let backend_type = BackendType::from_str(backend_type)?;
    info!(backend = %backend_type, "Creating cache backend");

    let backend: Arc<dyn CacheBackend> = match backend_type {
        BackendType::EmbeddedDocument => Arc::new(DocumentCache::new(config)?),
        BackendType::RemoteKv => Arc::new(RedisCache::new(config).await?),
        BackendType::Disk => Arc::new(DiskCache::new(config)?),
        BackendType::DistributedMemory => Arc::new(MemcachedCache::new(config)?),
        BackendType::EmbeddedBtree => Arc::new(BtreeCache::new(config)?),
    };
    Ok(backend)
}
