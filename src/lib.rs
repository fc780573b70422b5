//! Multi-Backend Cache
//!
//! A uniform caching contract over five interchangeable storage engines:
//! - **`embedded-document`**: embedded document store (sled) with TTL and
//!   access tracking implemented above the store
//! - **`remote-kv`**: remote in-memory key-value server (Redis) with native
//!   TTL, atomic increment and pattern scanning
//! - **`disk`**: disk-resident cache (cacache) with an advisory byte budget
//! - **`distributed-memory`**: distributed memory-cache protocol (Memcached)
//! - **`embedded-btree`**: memory-mapped transactional B+tree (LMDB)
//!
//! The hard part this crate owns is normalizing wildly different native
//! capabilities — TTL introspection, atomic counters, key enumeration,
//! persistence guarantees, serialization needs — into one consistent
//! interface without silently breaking invariants when swapping backends.
//! Capability gaps are documented per backend and surfaced as specified
//! defaults, never as crashes.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use multi_backend_cache::{create_cache_backend, BackendConfig, CacheValue, Ttl};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), multi_backend_cache::CacheError> {
//!     let config = BackendConfig::default()
//!         .with_directory("./cache-data")
//!         .with_default_ttl(300);
//!     let cache = create_cache_backend("embedded-document", &config).await?;
//!
//!     let data = serde_json::json!({"user": "alice", "score": 100});
//!     cache.set("user:1", CacheValue::from(data), Ttl::Default).await;
//!
//!     if let Some(cached) = cache.get("user:1").await {
//!         tracing::info!(?cached, "cache hit");
//!     }
//!
//!     // Swap the backend without touching call sites:
//!     // let cache = create_cache_backend("remote-kv", &config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error policy
//!
//! Cache unavailability never crashes a caller that merely wanted
//! acceleration: every operation except `incr` degrades to a safe default
//! and logs the underlying failure. `incr` re-raises, because a lost
//! increment is a correctness bug. See [`traits::CacheBackend`].

pub mod backends;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod pattern;
pub mod traits;

pub use backends::{
    BackendType, BtreeCache, DiskCache, DocumentCache, MemcachedCache, RedisCache,
    create_cache_backend,
};
pub use codec::ValueCodec;
pub use config::BackendConfig;
pub use entry::{CacheEntry, CacheValue, Ttl};
pub use error::{CacheError, CacheResult};
pub use traits::{CacheBackend, TTL_MISSING, TTL_NO_EXPIRY};

// Re-export async_trait for downstream backend implementations
pub use async_trait::async_trait;
