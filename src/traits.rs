//! Cache Backend Trait
//!
//! This module defines the uniform operation set every storage backend
//! implements. Callers obtain a backend from
//! [`create_cache_backend`](crate::backends::create_cache_backend) and talk
//! to it exclusively through this trait; which engine sits underneath is a
//! configuration detail.
//!
//! # Error policy
//!
//! Cache unavailability must never crash a feature that merely wanted
//! acceleration. Every operation except `incr` therefore catches underlying
//! client errors, logs them, and degrades to a safe default (`None`, `false`,
//! an empty collection, `-2`, `0`). `incr` is the deliberate exception: a
//! lost increment is a correctness bug, so it surfaces
//! [`NotANumber`](crate::CacheError::NotANumber) and
//! [`BackendOperation`](crate::CacheError::BackendOperation) errors to the
//! caller.
//!
//! # Example: running against any backend
//!
//! ```rust,no_run
//! use multi_backend_cache::{create_cache_backend, BackendConfig, CacheValue, Ttl};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), multi_backend_cache::CacheError> {
//!     let config = BackendConfig::default().with_default_ttl(300);
//!     let cache = create_cache_backend("embedded-document", &config).await?;
//!
//!     cache.set("user:1", CacheValue::from("alice"), Ttl::Default).await;
//!     if let Some(value) = cache.get("user:1").await {
//!         tracing::info!(?value, "cache hit");
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;

use crate::entry::{CacheValue, Ttl};
use crate::error::CacheError;

/// `ttl()` result for a key with no expiry.
pub const TTL_NO_EXPIRY: i64 = -1;
/// `ttl()` result for an absent (or just-expired) key.
pub const TTL_MISSING: i64 = -2;

/// Uniform contract implemented by all five storage backends.
///
/// # Consistency
///
/// Each call is atomic with respect to the backend's own consistency model,
/// not across calls. Ordering guarantees are per-key only: two calls against
/// the same key from the same task observe their own writes immediately.
///
/// # Thread safety
///
/// Implementations are `Send + Sync`; embedded backends serialize their
/// read-modify-write sequences behind an internal per-instance mutex, network
/// backends rely on their client library's connection-level thread safety.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value by key.
    ///
    /// Returns `None` if the key is missing or expired. Observing an expired
    /// entry lazily deletes it before returning; expired entries are never
    /// returned as present.
    async fn get(&self, key: &str) -> Option<CacheValue>;

    /// Store a value, overwriting any existing entry.
    ///
    /// [`Ttl::Default`] applies the backend's configured default,
    /// [`Ttl::Never`] stores a never-expiring entry. Returns `false` (and
    /// logs) on failure.
    async fn set(&self, key: &str, value: CacheValue, ttl: Ttl) -> bool;

    /// Remove a key. Returns `true` iff the key existed and was removed;
    /// deleting an absent key is a side-effect-free `false`.
    async fn delete(&self, key: &str) -> bool;

    /// Whether a key is present and not expired. Triggers the same
    /// lazy-expiry cleanup as `get`, without access bookkeeping.
    async fn exists(&self, key: &str) -> bool;

    /// Remaining lifetime in seconds: [`TTL_NO_EXPIRY`] (`-1`) for a present
    /// key with no expiry, [`TTL_MISSING`] (`-2`) for an absent or
    /// just-expired key.
    ///
    /// The disk and distributed-memory backends cannot introspect remaining
    /// TTL and report `-1` for any present key; see their module docs.
    async fn ttl(&self, key: &str) -> i64;

    /// Re-apply a TTL to an existing key, resetting its creation timestamp.
    /// Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> bool;

    /// List non-expired keys matching a glob pattern (`*`, `?`).
    ///
    /// The distributed-memory backend has no enumeration capability and
    /// always returns an empty list with a logged warning.
    async fn keys(&self, pattern: &str) -> Vec<String>;

    /// Best-effort batch fetch. Keys with no value are simply absent from
    /// the result map; this never fails.
    async fn mget(&self, keys: &[String]) -> HashMap<String, CacheValue>;

    /// Batch store. The partial-failure policy is backend-specific (loop of
    /// sets, two-step native batch, or a single atomic transaction) and
    /// documented per backend. Returns `false` on any failure.
    async fn mset(&self, entries: HashMap<String, CacheValue>, ttl: Ttl) -> bool;

    /// Atomic numeric increment. An absent key is initialized to `amount`.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotANumber`] if the existing value cannot be read as an
    /// integer; [`CacheError::BackendOperation`] /
    /// [`CacheError::BackendUnavailable`] for underlying failures. Unlike
    /// every other operation these are re-raised, not swallowed.
    async fn incr(&self, key: &str, amount: i64) -> Result<i64, CacheError>;

    /// Remove every entry in this backend's namespace.
    async fn flush_all(&self) -> bool;

    /// Backend identity and counters. Shape varies per backend, but always
    /// includes at least `backend`, `status` and `total_items`.
    async fn get_info(&self) -> serde_json::Value;

    /// Proactively remove expired entries, returning the count removed.
    /// Backends with native expiry return `0`.
    async fn cleanup_expired(&self) -> u64;

    /// Verify the backend is operational with a set/get/remove probe.
    async fn health_check(&self) -> bool;

    /// Static backend label; matches the factory's type tag.
    fn name(&self) -> &'static str;
}
