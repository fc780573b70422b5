//! Disk Cache - On-Disk Backend
//!
//! Content-addressed disk cache. Each entry's expiry deadline rides in the
//! store's per-entry index metadata; values use the tagged byte envelope.
//!
//! # Capability notes
//!
//! - **TTL introspection is approximate**: the store cannot report an exact
//!   remaining duration, so `ttl()` returns `-1` (never expires) for any
//!   present key. This is a documented limitation, not a bug.
//! - `expire` re-writes the entry with a new deadline (read + rewrite). A
//!   concurrent delete between the read and the rewrite silently drops the
//!   expire request.
//! - `size_limit_bytes` is an advisory budget reported by `get_info`; the
//!   store does not enforce it per write.

use parking_lot::Mutex;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

use crate::codec::ValueCodec;
use crate::config::BackendConfig;
use crate::entry::{CacheValue, Ttl, now_millis};
use crate::error::{CacheError, CacheResult};
use crate::pattern::glob_match;
use crate::traits::{CacheBackend, TTL_MISSING, TTL_NO_EXPIRY};

/// Disk-resident cache backend.
pub struct DiskCache {
    /// Cache directory
    dir: PathBuf,
    /// Advisory byte budget
    size_limit: Option<u64>,
    /// TTL applied when `set`/`mset` omit one
    default_ttl: Option<u64>,
    /// Guards read-modify-write sequences (`incr`); scoped per public method
    lock: Mutex<()>,
    /// Hit counter
    hits: AtomicU64,
    /// Miss counter
    misses: AtomicU64,
    /// Set counter
    sets: AtomicU64,
}

impl DiskCache {
    /// Open (or create) the disk cache under `config.directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new(config: &BackendConfig) -> CacheResult<Self> {
        let dir = config
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("./cache-data/disk"));
        std::fs::create_dir_all(&dir)
            .map_err(|e| CacheError::BackendUnavailable(format!("cannot create cache dir: {e}")))?;

        info!(path = %dir.display(), size_limit = ?config.size_limit_bytes, "Initializing disk cache");

        Ok(Self {
            dir,
            size_limit: config.size_limit_bytes,
            default_ttl: config.default_ttl_secs,
            lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        })
    }

    fn deadline_of(metadata: &cacache::Metadata) -> Option<u64> {
        metadata
            .metadata
            .get("expires_at")
            .and_then(serde_json::Value::as_u64)
    }

    fn is_expired(metadata: &cacache::Metadata) -> bool {
        Self::deadline_of(metadata).is_some_and(|deadline| now_millis() > deadline)
    }

    fn write_raw(&self, key: &str, payload: &[u8], expires_at: Option<u64>) -> CacheResult<()> {
        let mut writer = cacache::WriteOpts::new()
            .metadata(json!({ "expires_at": expires_at }))
            .open_sync(&self.dir, key)?;
        writer
            .write_all(payload)
            .map_err(|e| CacheError::BackendOperation(format!("disk write failed: {e}")))?;
        writer.commit()?;
        Ok(())
    }

    fn remove_expired(&self, key: &str) {
        if let Err(e) = cacache::remove_sync(&self.dir, key) {
            error!(key = %key, error = %e, "[Disk] Failed to drop expired entry");
        } else {
            debug!(key = %key, "[Disk] Lazily dropped expired entry");
        }
    }

    /// Fetch the live (non-expired) metadata for a key, lazily dropping an
    /// expired entry on the way.
    fn live_metadata(&self, key: &str) -> CacheResult<Option<cacache::Metadata>> {
        match cacache::metadata_sync(&self.dir, key)? {
            Some(md) if Self::is_expired(&md) => {
                self.remove_expired(key);
                Ok(None)
            }
            other => Ok(other),
        }
    }
}

// ===== Trait Implementation =====

use async_trait::async_trait;

#[async_trait]
impl CacheBackend for DiskCache {
    async fn get(&self, key: &str) -> Option<CacheValue> {
        match self.live_metadata(key) {
            Ok(Some(md)) => match cacache::read_hash_sync(&self.dir, &md.integrity) {
                Ok(raw) => match ValueCodec::decode(&raw) {
                    Ok(value) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        Some(value)
                    }
                    Err(e) => {
                        error!(key = %key, error = %e, "[Disk] Failed to decode cached value");
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                },
                Err(e) => {
                    error!(key = %key, error = %e, "[Disk] Read failed");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] Metadata lookup failed");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Ttl) -> bool {
        let payload = match ValueCodec::encode(&value) {
            Ok(payload) => payload,
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] Failed to encode value");
                return false;
            }
        };
        let expires_at = ttl
            .resolve(self.default_ttl)
            .map(|secs| now_millis().saturating_add(secs.saturating_mul(1000)));

        match self.write_raw(key, &payload, expires_at) {
            Ok(()) => {
                self.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, expires_at = ?expires_at, "[Disk] Cached key");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] Set failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match cacache::metadata_sync(&self.dir, key) {
            Ok(Some(_)) => match cacache::remove_sync(&self.dir, key) {
                Ok(()) => true,
                Err(e) => {
                    error!(key = %key, error = %e, "[Disk] Delete failed");
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] Delete lookup failed");
                false
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.live_metadata(key) {
            Ok(md) => md.is_some(),
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] Exists check failed");
                false
            }
        }
    }

    async fn ttl(&self, key: &str) -> i64 {
        // The store cannot report remaining duration; any present key reads
        // as never-expiring.
        match self.live_metadata(key) {
            Ok(Some(_)) => TTL_NO_EXPIRY,
            Ok(None) => TTL_MISSING,
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] TTL lookup failed");
                TTL_MISSING
            }
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        // Read + rewrite; not atomic against a concurrent delete.
        let md = match self.live_metadata(key) {
            Ok(Some(md)) => md,
            Ok(None) => return false,
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] Expire lookup failed");
                return false;
            }
        };
        let payload = match cacache::read_hash_sync(&self.dir, &md.integrity) {
            Ok(raw) => raw,
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] Expire read failed");
                return false;
            }
        };
        let deadline = now_millis().saturating_add(ttl_secs.saturating_mul(1000));
        match self.write_raw(key, &payload, Some(deadline)) {
            Ok(()) => true,
            Err(e) => {
                error!(key = %key, error = %e, "[Disk] Expire rewrite failed");
                false
            }
        }
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        let mut matches = Vec::new();
        let mut expired_keys = Vec::new();

        for item in cacache::list_sync(&self.dir) {
            match item {
                Ok(md) => {
                    if Self::is_expired(&md) {
                        expired_keys.push(md.key);
                    } else if glob_match(pattern, &md.key) {
                        matches.push(md.key);
                    }
                }
                Err(e) => error!(error = %e, "[Disk] Skipping unreadable index entry"),
            }
        }

        for key in &expired_keys {
            self.remove_expired(key);
        }
        debug!(pattern = %pattern, count = matches.len(), "[Disk] Scanned keys matching pattern");
        matches
    }

    async fn mget(&self, keys: &[String]) -> std::collections::HashMap<String, CacheValue> {
        let mut result = std::collections::HashMap::new();
        for key in keys {
            if let Some(value) = self.get(key).await {
                result.insert(key.clone(), value);
            }
        }
        result
    }

    async fn mset(&self, entries: std::collections::HashMap<String, CacheValue>, ttl: Ttl) -> bool {
        // Loop of individual sets: a midway failure leaves the batch
        // partially applied.
        for (key, value) in entries {
            if !self.set(&key, value, ttl).await {
                return false;
            }
        }
        true
    }

    async fn incr(&self, key: &str, amount: i64) -> Result<i64, CacheError> {
        let _guard = self.lock.lock();
        let current = match cacache::metadata_sync(&self.dir, key)? {
            Some(md) if Self::is_expired(&md) => {
                cacache::remove_sync(&self.dir, key)?;
                None
            }
            Some(md) => {
                let raw = cacache::read_hash_sync(&self.dir, &md.integrity)?;
                let value = ValueCodec::decode(&raw)?;
                Some((value, Self::deadline_of(&md)))
            }
            None => None,
        };

        match current {
            None => {
                let payload = ValueCodec::encode(&CacheValue::from(amount))?;
                self.write_raw(key, &payload, None)?;
                Ok(amount)
            }
            Some((value, deadline)) => {
                let current = value
                    .as_i64()
                    .ok_or_else(|| CacheError::NotANumber { key: key.to_string() })?;
                let next = current.checked_add(amount).ok_or_else(|| {
                    CacheError::BackendOperation(format!("integer overflow incrementing '{key}'"))
                })?;
                let payload = ValueCodec::encode(&CacheValue::from(next))?;
                self.write_raw(key, &payload, deadline)?;
                Ok(next)
            }
        }
    }

    async fn flush_all(&self) -> bool {
        let _guard = self.lock.lock();
        match std::fs::remove_dir_all(&self.dir).and_then(|()| std::fs::create_dir_all(&self.dir)) {
            Ok(()) => {
                info!("[Disk] Flushed all entries");
                true
            }
            Err(e) => {
                error!(error = %e, "[Disk] Flush failed");
                false
            }
        }
    }

    async fn get_info(&self) -> serde_json::Value {
        let mut total: u64 = 0;
        let mut expired: u64 = 0;
        let mut total_bytes: u64 = 0;
        for item in cacache::list_sync(&self.dir) {
            if let Ok(md) = item {
                total += 1;
                total_bytes += md.size as u64;
                if Self::is_expired(&md) {
                    expired += 1;
                }
            }
        }

        json!({
            "backend": self.name(),
            "status": "connected",
            "total_items": total,
            "expired_items": expired,
            "persistent_items": total,
            "total_bytes": total_bytes,
            "size_limit_bytes": self.size_limit,
            "path": self.dir.display().to_string(),
            "default_ttl_secs": self.default_ttl,
            "hits": self.hits.load(Ordering::Relaxed),
            "misses": self.misses.load(Ordering::Relaxed),
            "sets": self.sets.load(Ordering::Relaxed),
        })
    }

    async fn cleanup_expired(&self) -> u64 {
        let mut expired_keys = Vec::new();
        for item in cacache::list_sync(&self.dir) {
            if let Ok(md) = item {
                if Self::is_expired(&md) {
                    expired_keys.push(md.key);
                }
            }
        }

        let mut removed: u64 = 0;
        for key in &expired_keys {
            match cacache::remove_sync(&self.dir, key) {
                Ok(()) => removed += 1,
                Err(e) => error!(key = %key, error = %e, "[Disk] Cleanup removal failed"),
            }
        }
        if removed > 0 {
            debug!(count = removed, "[Disk] Cleaned up expired entries");
        }
        removed
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_disk";
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
        "disk"
    }
}
