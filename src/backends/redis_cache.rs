//! Redis Cache - Remote Key-Value Backend
//!
//! Redis-backed cache with native server-side TTL, atomic increment and
//! pattern scanning. This is the most authoritative backend for counter
//! semantics: `incr` is a true server-side atomic operation.
//!
//! # Capability notes
//!
//! - `mset` is a native multi-set followed by a per-key `EXPIRE` pipeline
//!   when a TTL applies. The two steps are not one atomic unit: a crash
//!   between them leaves the batch stored without the intended TTL (the
//!   entries default to never-expiring rather than vanishing).
//! - Structural values are stored as bare JSON text, so integers land as
//!   plain digit strings and server-side `INCRBY` interoperates with values
//!   written by `set`.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::codec::ValueCodec;
use crate::config::BackendConfig;
use crate::entry::{CacheValue, Ttl};
use crate::error::{CacheError, CacheResult};
use crate::traits::{CacheBackend, TTL_MISSING};

/// Redis remote cache with `ConnectionManager` for automatic reconnection.
pub struct RedisCache {
    /// Redis connection manager - handles reconnection automatically
    conn_manager: ConnectionManager,
    /// TTL applied when `set`/`mset` omit one
    default_ttl: Option<u64>,
    /// Per-operation timeout; elapsed timeouts surface as `BackendUnavailable`
    op_timeout: Duration,
    /// Hit counter
    hits: AtomicU64,
    /// Miss counter
    misses: AtomicU64,
    /// Set counter
    sets: AtomicU64,
}

impl RedisCache {
    /// Connect using `config.url`, the `REDIS_URL` environment variable, or
    /// the localhost default.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or the connection
    /// (including the PING probe) fails.
    pub async fn new(config: &BackendConfig) -> CacheResult<Self> {
        let redis_url = config.redis_url();
        info!(redis_url = %redis_url, "Initializing Redis cache with ConnectionManager");

        let client = Client::open(redis_url.as_str())
            .map_err(|e| CacheError::BackendUnavailable(format!("invalid Redis URL: {e}")))?;

        let op_timeout = config.operation_timeout();
        let conn_manager = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                CacheError::BackendUnavailable(format!(
                    "Redis connection timed out after {op_timeout:?}"
                ))
            })??;

        // Probe the connection before handing the backend out.
        let mut conn = conn_manager.clone();
        let _: String = tokio::time::timeout(
            op_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| CacheError::BackendUnavailable("Redis PING timed out".to_string()))??;

        info!(redis_url = %redis_url, "Redis cache connected successfully");

        Ok(Self {
            conn_manager,
            default_ttl: config.default_ttl_secs,
            op_timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        })
    }

    /// Run one Redis future under the configured operation timeout.
    async fn run<T, F>(&self, op: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::from(e)),
            Err(_) => Err(CacheError::BackendUnavailable(format!(
                "Redis {op} timed out after {:?}",
                self.op_timeout
            ))),
        }
    }

    /// Scan keys matching a glob pattern with the cursor-based SCAN command,
    /// which is safe for production use, unlike KEYS.
    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let result: (u64, Vec<String>) = self
                .run(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn),
                )
                .await?;

            cursor = result.0;
            keys.extend(result.1);

            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }
}

// ===== Trait Implementation =====

use async_trait::async_trait;

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Option<CacheValue> {
        let mut conn = self.conn_manager.clone();
        match self.run("GET", conn.get::<_, Option<Vec<u8>>>(key)).await {
            Ok(Some(raw)) => match ValueCodec::decode_kv(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                Err(e) => {
                    error!(key = %key, error = %e, "[Redis] Failed to decode cached value");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                error!(key = %key, error = %e, "[Redis] Get failed");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Ttl) -> bool {
        let payload = match ValueCodec::encode_kv(&value) {
            Ok(payload) => payload,
            Err(e) => {
                error!(key = %key, error = %e, "[Redis] Failed to encode value");
                return false;
            }
        };

        let mut conn = self.conn_manager.clone();
        let result = match ttl.resolve(self.default_ttl) {
            Some(secs) => self.run("SETEX", conn.set_ex::<_, _, ()>(key, payload, secs)).await,
            None => self.run("SET", conn.set::<_, _, ()>(key, payload)).await,
        };
        match result {
            Ok(()) => {
                self.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "[Redis] Cached key");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "[Redis] Set failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let mut conn = self.conn_manager.clone();
        match self.run("DEL", conn.del::<_, i64>(key)).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                error!(key = %key, error = %e, "[Redis] Delete failed");
                false
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let mut conn = self.conn_manager.clone();
        match self.run("EXISTS", conn.exists::<_, bool>(key)).await {
            Ok(present) => present,
            Err(e) => {
                error!(key = %key, error = %e, "[Redis] Exists check failed");
                false
            }
        }
    }

    async fn ttl(&self, key: &str) -> i64 {
        // The server's TTL command already speaks this contract:
        // -1 = no expiry, -2 = absent.
        let mut conn = self.conn_manager.clone();
        match self.run("TTL", conn.ttl::<_, i64>(key)).await {
            Ok(remaining) => remaining,
            Err(e) => {
                error!(key = %key, error = %e, "[Redis] TTL lookup failed");
                TTL_MISSING
            }
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        let mut conn = self.conn_manager.clone();
        let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        match self.run("EXPIRE", conn.expire::<_, bool>(key, secs)).await {
            Ok(applied) => applied,
            Err(e) => {
                error!(key = %key, error = %e, "[Redis] Expire failed");
                false
            }
        }
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        match self.scan_keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(pattern = %pattern, error = %e, "[Redis] Key scan failed");
                Vec::new()
            }
        }
    }

    async fn mget(&self, keys: &[String]) -> HashMap<String, CacheValue> {
        let mut result = HashMap::new();
        if keys.is_empty() {
            return result;
        }

        let mut conn = self.conn_manager.clone();
        match self
            .run("MGET", conn.mget::<_, Vec<Option<Vec<u8>>>>(keys))
            .await
        {
            Ok(values) => {
                for (key, raw) in keys.iter().zip(values) {
                    if let Some(raw) = raw {
                        match ValueCodec::decode_kv(&raw) {
                            Ok(value) => {
                                result.insert(key.clone(), value);
                            }
                            Err(e) => {
                                error!(key = %key, error = %e, "[Redis] Skipping undecodable value");
                            }
                        }
                    }
                }
            }
            Err(e) => error!(error = %e, "[Redis] Batch get failed"),
        }
        result
    }

    async fn mset(&self, entries: HashMap<String, CacheValue>, ttl: Ttl) -> bool {
        if entries.is_empty() {
            return true;
        }

        let mut items = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            match ValueCodec::encode_kv(value) {
                Ok(payload) => items.push((key.clone(), payload)),
                Err(e) => {
                    error!(key = %key, error = %e, "[Redis] Failed to encode batch value");
                    return false;
                }
            }
        }

        let mut conn = self.conn_manager.clone();
        if let Err(e) = self.run("MSET", conn.mset::<_, _, ()>(&items)).await {
            error!(error = %e, "[Redis] Batch set failed");
            return false;
        }
        self.sets.fetch_add(items.len() as u64, Ordering::Relaxed);

        // The native multi-set has no per-call TTL, so expiry lands in a
        // second round trip. A crash between the two leaves the batch stored
        // without the intended TTL.
        if let Some(secs) = ttl.resolve(self.default_ttl) {
            let secs = i64::try_from(secs).unwrap_or(i64::MAX);
            let mut pipe = redis::pipe();
            for key in entries.keys() {
                pipe.expire(key, secs).ignore();
            }
            let applied: CacheResult<()> =
                self.run("EXPIRE pipeline", pipe.query_async(&mut conn)).await;
            if let Err(e) = applied {
                error!(error = %e, "[Redis] Batch TTL application failed");
                return false;
            }
        }
        true
    }

    async fn incr(&self, key: &str, amount: i64) -> Result<i64, CacheError> {
        // Server-side INCRBY: atomic, and an absent key starts from zero, so
        // it ends up initialized to `amount`.
        let mut conn = self.conn_manager.clone();
        self.run("INCRBY", conn.incr::<_, _, i64>(key, amount))
            .await
            .map_err(|e| match e {
                CacheError::BackendOperation(msg) if msg.contains("not an integer") => {
                    CacheError::NotANumber { key: key.to_string() }
                }
                other => other,
            })
    }

    async fn flush_all(&self) -> bool {
        let mut conn = self.conn_manager.clone();
        let result: CacheResult<()> = self
            .run("FLUSHDB", redis::cmd("FLUSHDB").query_async(&mut conn))
            .await;
        match result {
            Ok(()) => {
                info!("[Redis] Flushed all entries");
                true
            }
            Err(e) => {
                error!(error = %e, "[Redis] Flush failed");
                false
            }
        }
    }

    async fn get_info(&self) -> serde_json::Value {
        let mut conn = self.conn_manager.clone();
        let result: CacheResult<i64> = self
            .run("DBSIZE", redis::cmd("DBSIZE").query_async(&mut conn))
            .await;
        let (status, total_items) = match result {
            Ok(count) => ("connected", count.max(0)),
            Err(e) => {
                error!(error = %e, "[Redis] Info lookup failed");
                ("unavailable", 0)
            }
        };

        json!({
            "backend": self.name(),
            "status": status,
            "total_items": total_items,
            "default_ttl_secs": self.default_ttl,
            "hits": self.hits.load(Ordering::Relaxed),
            "misses": self.misses.load(Ordering::Relaxed),
            "sets": self.sets.load(Ordering::Relaxed),
        })
    }

    async fn cleanup_expired(&self) -> u64 {
        // Expiry is native and server-side; nothing to collect here.
        0
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_redis";
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
        "remote-kv"
    }
}
