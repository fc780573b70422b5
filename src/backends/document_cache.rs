//! Document Cache - Embedded Document Store Backend
//!
//! Entries live as JSON documents in a named sled tree. The store has no
//! native TTL or pattern matching, so expiry, lazy cleanup, access
//! bookkeeping and glob matching are all implemented in this layer on top of
//! the [`CacheEntry`] model.
//!
//! # Capability notes
//!
//! - `keys(pattern)` scans every document and matches in-process: O(n) in
//!   total entry count.
//! - `incr` is synchronized with the backend mutex, which approximates
//!   atomicity for same-process callers only; it is not safe across separate
//!   processes sharing the same store.
//! - `mset` degrades to a loop of individual `set` calls: a failure midway
//!   leaves a partially-applied batch, there is no rollback.

use parking_lot::Mutex;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

use crate::config::BackendConfig;
use crate::entry::{CacheEntry, CacheValue, Ttl};
use crate::error::{CacheError, CacheResult};
use crate::pattern::glob_match;
use crate::traits::{CacheBackend, TTL_MISSING};

/// Embedded document store cache.
pub struct DocumentCache {
    /// Store handle, kept for whole-store statistics
    db: sled::Db,
    /// The tree holding this backend's namespace
    tree: sled::Tree,
    /// Where the store lives on disk
    path: PathBuf,
    /// TTL applied when `set`/`mset` omit one
    default_ttl: Option<u64>,
    /// Guards read-modify-write sequences; scoped per public method call
    lock: Mutex<()>,
    /// Hit counter
    hits: AtomicU64,
    /// Miss counter
    misses: AtomicU64,
    /// Set counter
    sets: AtomicU64,
}

impl DocumentCache {
    /// Open (or create) the document store under `config.directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn new(config: &BackendConfig) -> CacheResult<Self> {
        let path = config
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("./cache-data/documents"));
        let namespace = config.namespace.as_deref().unwrap_or("cache_entries");

        info!(path = %path.display(), namespace = %namespace, "Initializing document cache");

        let mut builder = sled::Config::new().path(&path);
        if let Some(limit) = config.size_limit_bytes {
            builder = builder.cache_capacity(limit);
        }
        let db = builder.open()?;
        let tree = db.open_tree(namespace)?;

        Ok(Self {
            db,
            tree,
            path,
            default_ttl: config.default_ttl_secs,
            lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        })
    }

    fn read_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        match self.tree.get(key)? {
            Some(raw) => Ok(Some(CacheEntry::from_document(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_entry(&self, entry: &CacheEntry) -> CacheResult<()> {
        let doc = entry.to_document()?;
        self.tree.insert(entry.key.as_str(), doc)?;
        Ok(())
    }

    fn remove_expired(&self, key: &str) {
        if let Err(e) = self.tree.remove(key) {
            error!(key = %key, error = %e, "[Document] Failed to drop expired entry");
        } else {
            debug!(key = %key, "[Document] Lazily dropped expired entry");
        }
    }
}

// ===== Trait Implementation =====

use async_trait::async_trait;

#[async_trait]
impl CacheBackend for DocumentCache {
    async fn get(&self, key: &str) -> Option<CacheValue> {
        let _guard = self.lock.lock();
        match self.read_entry(key) {
            Ok(Some(entry)) if entry.is_expired() => {
                self.remove_expired(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Ok(Some(mut entry)) => {
                entry.touch();
                // Losing the bookkeeping write is tolerated; the value is not.
                if let Err(e) = self.write_entry(&entry) {
                    error!(key = %key, error = %e, "[Document] Failed to persist access bookkeeping");
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                error!(key = %key, error = %e, "[Document] Get failed");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Ttl) -> bool {
        let entry = CacheEntry::new(key, value, ttl.resolve(self.default_ttl));
        let _guard = self.lock.lock();
        match self.write_entry(&entry) {
            Ok(()) => {
                self.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, ttl = ?entry.ttl, "[Document] Stored entry");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "[Document] Set failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let _guard = self.lock.lock();
        match self.tree.remove(key) {
            Ok(existing) => existing.is_some(),
            Err(e) => {
                error!(key = %key, error = %e, "[Document] Delete failed");
                false
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let _guard = self.lock.lock();
        match self.read_entry(key) {
            Ok(Some(entry)) if entry.is_expired() => {
                self.remove_expired(key);
                false
            }
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                error!(key = %key, error = %e, "[Document] Exists check failed");
                false
            }
        }
    }

    async fn ttl(&self, key: &str) -> i64 {
        let _guard = self.lock.lock();
        match self.read_entry(key) {
            Ok(Some(entry)) if entry.is_expired() => {
                self.remove_expired(key);
                TTL_MISSING
            }
            Ok(Some(entry)) => entry.remaining_secs(),
            Ok(None) => TTL_MISSING,
            Err(e) => {
                error!(key = %key, error = %e, "[Document] TTL lookup failed");
                TTL_MISSING
            }
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        let _guard = self.lock.lock();
        match self.read_entry(key) {
            Ok(Some(entry)) if entry.is_expired() => {
                self.remove_expired(key);
                false
            }
            Ok(Some(mut entry)) => {
                entry.reset_ttl(Some(ttl_secs));
                match self.write_entry(&entry) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(key = %key, error = %e, "[Document] Expire failed");
                        false
                    }
                }
            }
            Ok(None) => false,
            Err(e) => {
                error!(key = %key, error = %e, "[Document] Expire failed");
                false
            }
        }
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        let _guard = self.lock.lock();
        let mut matches = Vec::new();
        let mut expired_keys = Vec::new();

        for item in self.tree.iter() {
            match item {
                Ok((_, raw)) => match CacheEntry::from_document(&raw) {
                    Ok(entry) if entry.is_expired() => expired_keys.push(entry.key),
                    Ok(entry) => {
                        if glob_match(pattern, &entry.key) {
                            matches.push(entry.key);
                        }
                    }
                    Err(e) => error!(error = %e, "[Document] Skipping undecodable entry"),
                },
                Err(e) => {
                    error!(error = %e, "[Document] Key scan aborted");
                    break;
                }
            }
        }

        for key in &expired_keys {
            self.remove_expired(key);
        }
        debug!(pattern = %pattern, count = matches.len(), "[Document] Scanned keys matching pattern");
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
        let current = match self.read_entry(key)? {
            Some(entry) if entry.is_expired() => {
                self.tree.remove(key)?;
                None
            }
            other => other,
        };

        match current {
            None => {
                let entry = CacheEntry::new(key, CacheValue::from(amount), None);
                self.write_entry(&entry)?;
                Ok(amount)
            }
            Some(mut entry) => {
                let current = entry
                    .value
                    .as_i64()
                    .ok_or_else(|| CacheError::NotANumber { key: key.to_string() })?;
                let next = current.checked_add(amount).ok_or_else(|| {
                    CacheError::BackendOperation(format!("integer overflow incrementing '{key}'"))
                })?;
                entry.value = CacheValue::from(next);
                self.write_entry(&entry)?;
                Ok(next)
            }
        }
    }

    async fn flush_all(&self) -> bool {
        let _guard = self.lock.lock();
        match self.tree.clear() {
            Ok(()) => {
                info!("[Document] Flushed all entries");
                true
            }
            Err(e) => {
                error!(error = %e, "[Document] Flush failed");
                false
            }
        }
    }

    async fn get_info(&self) -> serde_json::Value {
        let _guard = self.lock.lock();
        let mut total: u64 = 0;
        let mut expired: u64 = 0;
        for item in self.tree.iter() {
            if let Ok((_, raw)) = item {
                total += 1;
                if CacheEntry::from_document(&raw).map(|e| e.is_expired()).unwrap_or(false) {
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
            "path": self.path.display().to_string(),
            "size_on_disk_bytes": self.db.size_on_disk().unwrap_or(0),
            "default_ttl_secs": self.default_ttl,
            "hits": self.hits.load(Ordering::Relaxed),
            "misses": self.misses.load(Ordering::Relaxed),
            "sets": self.sets.load(Ordering::Relaxed),
        })
    }

    async fn cleanup_expired(&self) -> u64 {
        let _guard = self.lock.lock();
        let mut expired_keys = Vec::new();
        for item in self.tree.iter() {
            if let Ok((_, raw)) = item {
                if let Ok(entry) = CacheEntry::from_document(&raw) {
                    if entry.is_expired() {
                        expired_keys.push(entry.key);
                    }
                }
            }
        }

        let mut removed: u64 = 0;
        for key in &expired_keys {
            match self.tree.remove(key.as_str()) {
                Ok(Some(_)) => removed += 1,
                Ok(None) => {}
                Err(e) => error!(key = %key, error = %e, "[Document] Cleanup removal failed"),
            }
        }
        if removed > 0 {
            debug!(count = removed, "[Document] Cleaned up expired entries");
        }
        removed
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_document";
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
        "embedded-document"
    }
}
