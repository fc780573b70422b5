//! Memcached Cache - Distributed Memory Backend
//!
//! Memcached-based distributed cache. The protocol is binary-native, so every
//! value travels through the tagged byte envelope unconditionally.
//!
//! # Capability notes
//!
//! - The protocol has **no key enumeration**: `keys()` always returns an
//!   empty list and logs a capability warning. Callers must not rely on
//!   enumeration against this backend.
//! - Remaining TTL cannot be queried: `ttl()` returns `-1` for any present
//!   key.
//! - `incr` is native and atomic, but only valid for values previously
//!   stored as integers. An absent key is initialized to `0` and then
//!   incremented in two round trips; two concurrent first-time incrementers
//!   can both observe "absent" and lose an update.

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

use crate::codec::ValueCodec;
use crate::config::BackendConfig;
use crate::entry::{CacheValue, Ttl};
use crate::error::{CacheError, CacheResult};
use crate::traits::{CacheBackend, TTL_MISSING, TTL_NO_EXPIRY};

/// Memcached distributed cache.
pub struct MemcachedCache {
    /// Memcached client
    client: memcache::Client,
    /// TTL applied when `set`/`mset` omit one
    default_ttl: Option<u64>,
    /// Hit counter
    hits: AtomicU64,
    /// Miss counter
    misses: AtomicU64,
    /// Set counter
    sets: AtomicU64,
}

impl MemcachedCache {
    /// Connect using `config.url`, the `MEMCACHED_URL` environment variable,
    /// or the localhost default.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or the version probe
    /// fails.
    pub fn new(config: &BackendConfig) -> CacheResult<Self> {
        let memcached_url = config.memcached_url();
        info!(url = %memcached_url, "Initializing Memcached cache");

        let client = memcache::connect(memcached_url.as_str())
            .map_err(|e| CacheError::BackendUnavailable(format!("Memcached connect failed: {e}")))?;

        let timeout = config.operation_timeout();
        client.set_read_timeout(Some(timeout))?;
        client.set_write_timeout(Some(timeout))?;

        // Probe the connection with the version command.
        let versions = client
            .version()
            .map_err(|e| CacheError::BackendUnavailable(format!("Memcached version probe failed: {e}")))?;
        info!(
            url = %memcached_url,
            server_count = versions.len(),
            "Memcached cache connected successfully"
        );

        Ok(Self {
            client,
            default_ttl: config.default_ttl_secs,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        })
    }

    fn expiration_for(&self, ttl: Ttl) -> u32 {
        // Memcached uses 0 for "never expires".
        match ttl.resolve(self.default_ttl) {
            Some(secs) => u32::try_from(secs).unwrap_or(u32::MAX),
            None => 0,
        }
    }

    /// Whether a raw stored value is something the server's arithmetic can
    /// operate on (an unsigned decimal string).
    fn is_counter_value(raw: &[u8]) -> bool {
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .is_some()
    }
}

// ===== Trait Implementation =====

use async_trait::async_trait;

#[async_trait]
impl CacheBackend for MemcachedCache {
    async fn get(&self, key: &str) -> Option<CacheValue> {
        match self.client.get::<Vec<u8>>(key) {
            Ok(Some(raw)) => match ValueCodec::decode(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                // Counters written by the server's arithmetic are bare digit
                // strings, not enveloped payloads.
                Err(_) if Self::is_counter_value(&raw) => {
                    let value = std::str::from_utf8(&raw)
                        .ok()
                        .and_then(|s| s.trim().parse::<i64>().ok())
                        .map(CacheValue::from);
                    if value.is_some() {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                    }
                    value
                }
                Err(e) => {
                    error!(key = %key, error = %e, "[Memcached] Failed to decode cached value");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                error!(key = %key, error = %e, "[Memcached] Get failed");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Ttl) -> bool {
        let payload = match ValueCodec::encode(&value) {
            Ok(payload) => payload,
            Err(e) => {
                error!(key = %key, error = %e, "[Memcached] Failed to encode value");
                return false;
            }
        };
        let expiration = self.expiration_for(ttl);

        match self.client.set(key, payload.as_slice(), expiration) {
            Ok(()) => {
                self.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, expiration = expiration, "[Memcached] Cached key");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "[Memcached] Set failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match self.client.delete(key) {
            Ok(existed) => existed,
            Err(e) => {
                error!(key = %key, error = %e, "[Memcached] Delete failed");
                false
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.client.get::<Vec<u8>>(key) {
            Ok(present) => present.is_some(),
            Err(e) => {
                error!(key = %key, error = %e, "[Memcached] Exists check failed");
                false
            }
        }
    }

    async fn ttl(&self, key: &str) -> i64 {
        // The protocol cannot report remaining duration; any present key
        // reads as never-expiring.
        if self.exists(key).await {
            TTL_NO_EXPIRY
        } else {
            TTL_MISSING
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        let expiration = u32::try_from(ttl_secs).unwrap_or(u32::MAX);
        match self.client.touch(key, expiration) {
            Ok(applied) => applied,
            Err(e) => {
                error!(key = %key, error = %e, "[Memcached] Touch failed");
                false
            }
        }
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        warn!(
            pattern = %pattern,
            "[Memcached] Key enumeration is not supported by the protocol; returning empty list"
        );
        Vec::new()
    }

    async fn mget(&self, keys: &[String]) -> HashMap<String, CacheValue> {
        let mut result = HashMap::new();
        if keys.is_empty() {
            return result;
        }

        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        match self.client.gets::<Vec<u8>>(&refs) {
            Ok(found) => {
                for (key, raw) in found {
                    match ValueCodec::decode(&raw) {
                        Ok(value) => {
                            result.insert(key, value);
                        }
                        Err(e) => {
                            error!(key = %key, error = %e, "[Memcached] Skipping undecodable value");
                        }
                    }
                }
            }
            Err(e) => error!(error = %e, "[Memcached] Batch get failed"),
        }
        result
    }

    async fn mset(&self, entries: HashMap<String, CacheValue>, ttl: Ttl) -> bool {
        // The client exposes no multi-set; a midway failure leaves the batch
        // partially applied.
        for (key, value) in entries {
            if !self.set(&key, value, ttl).await {
                return false;
            }
        }
        true
    }

    async fn incr(&self, key: &str, amount: i64) -> Result<i64, CacheError> {
        match self.client.get::<Vec<u8>>(key)? {
            Some(raw) => {
                if !Self::is_counter_value(&raw) {
                    return Err(CacheError::NotANumber { key: key.to_string() });
                }
            }
            None => {
                // Initialize then increment: two round trips. Concurrent
                // first-time incrementers can race here.
                self.client.set(key, "0", 0)?;
            }
        }

        let result = if amount >= 0 {
            self.client.increment(key, amount.unsigned_abs())
        } else {
            // The server clamps decrements at zero.
            self.client.decrement(key, amount.unsigned_abs())
        };
        let value = result?;
        i64::try_from(value).map_err(|_| {
            CacheError::BackendOperation(format!("counter at '{key}' exceeds i64 range"))
        })
    }

    async fn flush_all(&self) -> bool {
        match self.client.flush() {
            Ok(()) => {
                info!("[Memcached] Flushed all entries");
                true
            }
            Err(e) => {
                error!(error = %e, "[Memcached] Flush failed");
                false
            }
        }
    }

    async fn get_info(&self) -> serde_json::Value {
        match self.client.stats() {
            Ok(stats) => {
                let mut total_items: u64 = 0;
                for (_server, fields) in &stats {
                    if let Some(count) = fields.get("curr_items") {
                        total_items += count.parse::<u64>().unwrap_or(0);
                    }
                }
                json!({
                    "backend": self.name(),
                    "status": "connected",
                    "total_items": total_items,
                    "in_memory_items": total_items,
                    "server_count": stats.len(),
                    "default_ttl_secs": self.default_ttl,
                    "hits": self.hits.load(Ordering::Relaxed),
                    "misses": self.misses.load(Ordering::Relaxed),
                    "sets": self.sets.load(Ordering::Relaxed),
                })
            }
            Err(e) => {
                error!(error = %e, "[Memcached] Stats lookup failed");
                json!({
                    "backend": self.name(),
                    "status": "unavailable",
                    "total_items": 0,
                })
            }
        }
    }

    async fn cleanup_expired(&self) -> u64 {
        // Expiry is native and server-side; nothing to collect here.
        0
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_memcached";
        let test_value = CacheValue::from("health_check_value");

        if !self.set(test_key, test_value.clone(), Ttl::Seconds(10)).await {
            return false;
        }
        match self.get(test_key).await {
            Some(retrieved) => {
                let _ = self.delete(test_key).await;
                retrieved == test_value
            }
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "distributed-memory"
    }
}
