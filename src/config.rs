//! Backend configuration
//!
//! One flat option struct shared by every backend; each backend reads the
//! fields it cares about and ignores the rest. Network backends fall back to
//! the conventional environment variables (`REDIS_URL`, `MEMCACHED_URL`)
//! before the localhost defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-operation timeout for network-backed stores, in seconds.
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 5;

/// Flat backend configuration map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Connection string for network backends
    /// (e.g. `redis://host:6379`, `memcache://host:11211`)
    pub url: Option<String>,
    /// Data directory for disk-resident backends
    pub directory: Option<PathBuf>,
    /// Tree/table name inside an embedded store
    pub namespace: Option<String>,
    /// Byte budget: sled read cache, LMDB map size, disk cache budget
    pub size_limit_bytes: Option<u64>,
    /// TTL applied whenever `set`/`mset` omit one; `None` means never expire
    pub default_ttl_secs: Option<u64>,
    /// Per-operation timeout for network backends, in seconds
    pub operation_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            directory: None,
            namespace: None,
            size_limit_bytes: None,
            default_ttl_secs: None,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    /// Set the connection string for a network backend.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the data directory for a disk-resident backend.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the default TTL in seconds.
    #[must_use]
    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl_secs = Some(secs);
        self
    }

    /// Set the byte budget.
    #[must_use]
    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit_bytes = Some(bytes);
        self
    }

    /// Redis connection string: explicit config, then `REDIS_URL`, then localhost.
    #[must_use]
    pub fn redis_url(&self) -> String {
        self.url
            .clone()
            .or_else(|| std::env::var("REDIS_URL").ok())
            .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string())
    }

    /// Memcached connection string: explicit config, then `MEMCACHED_URL`, then localhost.
    #[must_use]
    pub fn memcached_url(&self) -> String {
        self.url
            .clone()
            .or_else(|| std::env::var("MEMCACHED_URL").ok())
            .unwrap_or_else(|| "memcache://127.0.0.1:11211".to_string())
    }

    /// Per-operation timeout as a [`Duration`].
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}
