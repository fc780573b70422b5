//! BTree Cache - Embedded Memory-Mapped B+Tree Backend
//!
//! Entries live as bincode records in an LMDB database. Transactions are the
//! store's sole source of atomicity: every operation opens an explicit read
//! or write transaction.
//!
//! # Capability notes
//!
//! - `get` validates expiry inside a read transaction, then persists its
//!   access bookkeeping in a **separate** write transaction. The two are not
//!   atomic; a crash between them loses only the bookkeeping, never the data.
//! - `mset` applies the whole batch inside one write transaction. This is
//!   the only backend offering a true atomic batch-set across process
//!   crashes.
//! - `keys(pattern)` walks the store's cursor and glob-matches in-process.

use heed::types::{Bytes, Str};
use heed::{Database, EnvOpenOptions};
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

/// Default LMDB map size when no byte budget is configured (256 MiB).
const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;

/// Embedded memory-mapped B+tree cache.
pub struct BtreeCache {
    /// LMDB environment
    env: heed::Env,
    /// The database holding this backend's namespace
    db: Database<Str, Bytes>,
    /// Where the environment lives on disk
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

impl BtreeCache {
    /// Open (or create) the LMDB environment under `config.directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be opened or the database
    /// cannot be created.
    pub fn new(config: &BackendConfig) -> CacheResult<Self> {
        let path = config
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("./cache-data/btree"));
        std::fs::create_dir_all(&path)
            .map_err(|e| CacheError::BackendUnavailable(format!("cannot create env dir: {e}")))?;

        let map_size = config
            .size_limit_bytes
            .and_then(|bytes| usize::try_from(bytes).ok())
            .unwrap_or(DEFAULT_MAP_SIZE);
        let namespace = config.namespace.as_deref().unwrap_or("cache_entries");

        info!(path = %path.display(), map_size = map_size, namespace = %namespace, "Initializing B+tree cache");

        // Safety: the environment directory is owned by this backend and is
        // not opened twice within the process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(4)
                .open(&path)?
        };

        let mut wtxn = env.write_txn()?;
        let db = env.create_database::<Str, Bytes>(&mut wtxn, Some(namespace))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db,
            path,
            default_ttl: config.default_ttl_secs,
            lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        })
    }

    /// Read one entry inside its own read transaction.
    fn read_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let rtxn = self.env.read_txn()?;
        match self.db.get(&rtxn, key)? {
            Some(raw) => Ok(Some(CacheEntry::from_record(raw)?)),
            None => Ok(None),
        }
    }

    /// Write one entry inside its own write transaction.
    fn write_entry(&self, entry: &CacheEntry) -> CacheResult<()> {
        let record = entry.to_record()?;
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, &entry.key, &record)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Delete one key inside its own write transaction.
    fn delete_key(&self, key: &str) -> CacheResult<bool> {
        let mut wtxn = self.env.write_txn()?;
        let existed = self.db.delete(&mut wtxn, key)?;
        wtxn.commit()?;
        Ok(existed)
    }

    fn remove_expired(&self, key: &str) {
        match self.delete_key(key) {
            Ok(_) => debug!(key = %key, "[BTree] Lazily dropped expired entry"),
            Err(e) => error!(key = %key, error = %e, "[BTree] Failed to drop expired entry"),
        }
    }

    /// Collect the keys of expired entries under one read transaction.
    fn expired_keys(&self) -> CacheResult<Vec<String>> {
        let rtxn = self.env.read_txn()?;
        let mut expired = Vec::new();
        for item in self.db.iter(&rtxn)? {
            let (_, raw) = item?;
            if let Ok(entry) = CacheEntry::from_record(raw) {
                if entry.is_expired() {
                    expired.push(entry.key);
                }
            }
        }
        Ok(expired)
    }
}

// ===== Trait Implementation =====

use async_trait::async_trait;

#[async_trait]
impl CacheBackend for BtreeCache {
    async fn get(&self, key: &str) -> Option<CacheValue> {
        let _guard = self.lock.lock();
        // Read transaction: fetch and validate expiry.
        match self.read_entry(key) {
            Ok(Some(entry)) if entry.is_expired() => {
                self.remove_expired(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Ok(Some(mut entry)) => {
                // Separate write transaction for the bookkeeping; a crash in
                // between loses the bookkeeping, never the data.
                entry.touch();
                if let Err(e) = self.write_entry(&entry) {
                    error!(key = %key, error = %e, "[BTree] Failed to persist access bookkeeping");
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                error!(key = %key, error = %e, "[BTree] Get failed");
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
                debug!(key = %key, ttl = ?entry.ttl, "[BTree] Stored entry");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "[BTree] Set failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let _guard = self.lock.lock();
        match self.delete_key(key) {
            Ok(existed) => existed,
            Err(e) => {
                error!(key = %key, error = %e, "[BTree] Delete failed");
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
                error!(key = %key, error = %e, "[BTree] Exists check failed");
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
                error!(key = %key, error = %e, "[BTree] TTL lookup failed");
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
                        error!(key = %key, error = %e, "[BTree] Expire failed");
                        false
                    }
                }
            }
            Ok(None) => false,
            Err(e) => {
                error!(key = %key, error = %e, "[BTree] Expire failed");
                false
            }
        }
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        let _guard = self.lock.lock();
        let mut matches = Vec::new();
        let mut expired_keys = Vec::new();

        let scan: CacheResult<()> = (|| {
            let rtxn = self.env.read_txn()?;
            for item in self.db.iter(&rtxn)? {
                let (_, raw) = item?;
                match CacheEntry::from_record(raw) {
                    Ok(entry) if entry.is_expired() => expired_keys.push(entry.key),
                    Ok(entry) => {
                        if glob_match(pattern, &entry.key) {
                            matches.push(entry.key);
                        }
                    }
                    Err(e) => error!(error = %e, "[BTree] Skipping undecodable record"),
                }
            }
            Ok(())
        })();
        if let Err(e) = scan {
            error!(pattern = %pattern, error = %e, "[BTree] Key scan failed");
        }

        for key in &expired_keys {
            self.remove_expired(key);
        }
        debug!(pattern = %pattern, count = matches.len(), "[BTree] Scanned keys matching pattern");
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
        // One write transaction for the whole batch: all-or-nothing, even
        // across process crashes.
        let resolved = ttl.resolve(self.default_ttl);
        let count = entries.len() as u64;
        let _guard = self.lock.lock();

        let applied: CacheResult<()> = (|| {
            let mut wtxn = self.env.write_txn()?;
            for (key, value) in entries {
                let entry = CacheEntry::new(key, value, resolved);
                let record = entry.to_record()?;
                self.db.put(&mut wtxn, &entry.key, &record)?;
            }
            wtxn.commit()?;
            Ok(())
        })();

        match applied {
            Ok(()) => {
                self.sets.fetch_add(count, Ordering::Relaxed);
                true
            }
            Err(e) => {
                error!(error = %e, "[BTree] Batch set aborted");
                false
            }
        }
    }

    async fn incr(&self, key: &str, amount: i64) -> Result<i64, CacheError> {
        let _guard = self.lock.lock();
        let mut wtxn = self.env.write_txn()?;

        let decoded = match self.db.get(&wtxn, key)? {
            Some(raw) => Some(CacheEntry::from_record(raw)?),
            None => None,
        };
        let current = match decoded {
            Some(entry) if entry.is_expired() => {
                self.db.delete(&mut wtxn, key)?;
                None
            }
            other => other,
        };

        let (entry, next) = match current {
            None => (CacheEntry::new(key, CacheValue::from(amount), None), amount),
            Some(mut entry) => {
                let current = entry
                    .value
                    .as_i64()
                    .ok_or_else(|| CacheError::NotANumber { key: key.to_string() })?;
                let next = current.checked_add(amount).ok_or_else(|| {
                    CacheError::BackendOperation(format!("integer overflow incrementing '{key}'"))
                })?;
                entry.value = CacheValue::from(next);
                (entry, next)
            }
        };

        let record = entry.to_record()?;
        self.db.put(&mut wtxn, &entry.key, &record)?;
        wtxn.commit()?;
        Ok(next)
    }

    async fn flush_all(&self) -> bool {
        let _guard = self.lock.lock();
        let cleared: CacheResult<()> = (|| {
            let mut wtxn = self.env.write_txn()?;
            self.db.clear(&mut wtxn)?;
            wtxn.commit()?;
            Ok(())
        })();
        match cleared {
            Ok(()) => {
                info!("[BTree] Flushed all entries");
                true
            }
            Err(e) => {
                error!(error = %e, "[BTree] Flush failed");
                false
            }
        }
    }

    async fn get_info(&self) -> serde_json::Value {
        let _guard = self.lock.lock();
        let stats: CacheResult<(u64, u64)> = (|| {
            let rtxn = self.env.read_txn()?;
            let total = self.db.len(&rtxn)?;
            let mut expired: u64 = 0;
            for item in self.db.iter(&rtxn)? {
                let (_, raw) = item?;
                if CacheEntry::from_record(raw).map(|e| e.is_expired()).unwrap_or(false) {
                    expired += 1;
                }
            }
            Ok((total, expired))
        })();
        let (status, total, expired) = match stats {
            Ok((total, expired)) => ("connected", total, expired),
            Err(e) => {
                error!(error = %e, "[BTree] Info lookup failed");
                ("unavailable", 0, 0)
            }
        };

        json!({
            "backend": self.name(),
            "status": status,
            "total_items": total,
            "expired_items": expired,
            "persistent_items": total,
            "path": self.path.display().to_string(),
            "default_ttl_secs": self.default_ttl,
            "hits": self.hits.load(Ordering::Relaxed),
            "misses": self.misses.load(Ordering::Relaxed),
            "sets": self.sets.load(Ordering::Relaxed),
        })
    }

    async fn cleanup_expired(&self) -> u64 {
        let _guard = self.lock.lock();
        let expired = match self.expired_keys() {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "[BTree] Cleanup scan failed");
                return 0;
            }
        };
        if expired.is_empty() {
            return 0;
        }

        let removed: CacheResult<u64> = (|| {
            let mut wtxn = self.env.write_txn()?;
            let mut removed: u64 = 0;
            for key in &expired {
                if self.db.delete(&mut wtxn, key)? {
                    removed += 1;
                }
            }
            wtxn.commit()?;
            Ok(removed)
        })();

        match removed {
            Ok(count) => {
                if count > 0 {
                    debug!(count = count, "[BTree] Cleaned up expired entries");
                }
                count
            }
            Err(e) => {
                error!(error = %e, "[BTree] Cleanup removal failed");
                0
            }
        }
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_btree";
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
        "embedded-btree"
    }
}
