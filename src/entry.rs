//! Cache entry model
//!
//! `CacheEntry` carries a cached value together with its TTL and access
//! bookkeeping. The embedded backends persist whole entries (as JSON
//! documents in the document store, as bincode records in the B+tree store)
//! because those stores have no native expiry; the network backends delegate
//! expiry to their servers and only store the value payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::CacheResult;

/// A value stored in the cache.
///
/// Structural payloads (`Json`) cover everything composed of strings,
/// numbers, booleans, null, maps and lists. Opaque payloads (`Bytes`) carry
/// anything the structural encoder cannot represent. The enum tag is the
/// structural-vs-opaque flag, so encoded forms never need sentinel sniffing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheValue {
    /// JSON-representable value
    Json(serde_json::Value),
    /// Opaque binary payload
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl CacheValue {
    /// Borrow the structural form, if this is a `Json` value.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            CacheValue::Json(v) => Some(v),
            CacheValue::Bytes(_) => None,
        }
    }

    /// Borrow the opaque form, if this is a `Bytes` value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CacheValue::Json(_) => None,
            CacheValue::Bytes(b) => Some(b),
        }
    }

    /// Interpret the value as an integer, the way `incr` needs to.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheValue::Json(v) => v.as_i64(),
            CacheValue::Bytes(_) => None,
        }
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(value: serde_json::Value) -> Self {
        CacheValue::Json(value)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Bytes(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Json(serde_json::Value::String(value.to_string()))
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Json(serde_json::Value::from(value))
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Json(serde_json::Value::Bool(value))
    }
}

/// TTL argument for `set`/`mset`.
///
/// Distinguishes "caller said nothing" (use the backend's configured default)
/// from "caller explicitly asked for no expiry".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the backend's configured default TTL.
    #[default]
    Default,
    /// Never expire.
    Never,
    /// Expire after this many seconds.
    Seconds(u64),
}

impl Ttl {
    /// Resolve against a backend's configured default.
    #[must_use]
    pub fn resolve(self, default_ttl: Option<u64>) -> Option<u64> {
        match self {
            Ttl::Default => default_ttl,
            Ttl::Never => None,
            Ttl::Seconds(secs) => Some(secs),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(value: Duration) -> Self {
        Ttl::Seconds(value.as_secs())
    }
}

/// A single cache entry with TTL and access bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller-chosen key, unique within a backend's namespace
    pub key: String,
    /// The stored value
    pub value: CacheValue,
    /// TTL in seconds; `None` means the entry never expires
    pub ttl: Option<u64>,
    /// Creation timestamp (unix milliseconds); reset when TTL is re-applied
    pub created_at: u64,
    /// Last successful read (unix milliseconds)
    pub last_accessed: u64,
    /// Number of successful reads
    pub access_count: u64,
    /// Reserved for batch-tag invalidation; round-trips but drives nothing yet
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    /// Create a new entry. `ttl` is in seconds, `None` means never expires.
    pub fn new(key: impl Into<String>, value: CacheValue, ttl: Option<u64>) -> Self {
        let now = now_millis();
        Self {
            key: key.into(),
            value,
            ttl,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            tags: BTreeSet::new(),
        }
    }

    /// Attach tags to the entry.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Absolute expiry deadline in unix milliseconds, if a TTL is set.
    #[must_use]
    pub fn expires_at(&self) -> Option<u64> {
        self.ttl
            .map(|secs| self.created_at.saturating_add(secs.saturating_mul(1000)))
    }

    /// An entry is expired iff a TTL is set and `now > created_at + ttl`.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at()
            .is_some_and(|deadline| now_millis() > deadline)
    }

    /// Remaining lifetime in whole seconds, rounded up; `-1` when no TTL is
    /// set. Callers handle the expired/absent case (`-2`) themselves.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        match self.expires_at() {
            None => -1,
            Some(deadline) => {
                let remaining_ms = deadline.saturating_sub(now_millis());
                i64::try_from(remaining_ms.div_ceil(1000)).unwrap_or(i64::MAX)
            }
        }
    }

    /// Record a successful read: bump `last_accessed`, increment
    /// `access_count`. Timestamps never go backward.
    pub fn touch(&mut self) {
        self.last_accessed = self.last_accessed.max(now_millis());
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Re-apply a TTL: both the TTL and the creation timestamp reset.
    pub fn reset_ttl(&mut self, ttl: Option<u64>) {
        self.ttl = ttl;
        self.created_at = now_millis();
    }

    /// Serialize to the document store's JSON form.
    pub fn to_document(&self) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the document store's JSON form.
    pub fn from_document(bytes: &[u8]) -> CacheResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize to the B+tree store's bincode record form.
    pub fn to_record(&self) -> CacheResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from the B+tree store's bincode record form.
    pub fn from_record(bytes: &[u8]) -> CacheResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Current unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    #[test]
    fn entry_without_ttl_never_expires() {
        let entry = CacheEntry::new("k", CacheValue::from("v"), None);
        assert!(!entry.is_expired());
        assert_eq!(entry.remaining_secs(), -1);
        assert!(entry.expires_at().is_none());
    }

    #[test]
    fn entry_expires_after_ttl() {
        let entry = CacheEntry::new("k", CacheValue::from(1), Some(1));
        assert!(!entry.is_expired());
        sleep(Duration::from_millis(1100));
        assert!(entry.is_expired());
    }

    #[test]
    fn remaining_secs_rounds_up() {
        let entry = CacheEntry::new("k", CacheValue::from(1), Some(60));
        assert_eq!(entry.remaining_secs(), 60);
    }

    #[test]
    fn touch_bumps_bookkeeping() {
        let mut entry = CacheEntry::new("k", CacheValue::from(1), None);
        let before = entry.last_accessed;
        sleep(Duration::from_millis(5));
        entry.touch();
        entry.touch();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_accessed >= before);
    }

    #[test]
    fn reset_ttl_moves_creation_timestamp() {
        let mut entry = CacheEntry::new("k", CacheValue::from(1), Some(1));
        sleep(Duration::from_millis(20));
        let old_created = entry.created_at;
        entry.reset_ttl(Some(60));
        assert!(entry.created_at >= old_created);
        assert_eq!(entry.ttl, Some(60));
    }

    #[test]
    fn document_form_round_trips_with_tags() {
        let entry = CacheEntry::new("k", CacheValue::Json(json!({"a": [1, 2, 3]})), Some(30))
            .with_tags(["alpha".to_string(), "beta".to_string()]);
        let bytes = entry.to_document().unwrap();
        let decoded = CacheEntry::from_document(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.tags.len(), 2);
    }

    #[test]
    fn record_form_round_trips_opaque_values() {
        let entry = CacheEntry::new("k", CacheValue::Bytes(vec![0, 1, 2, 255]), None);
        let bytes = entry.to_record().unwrap();
        let decoded = CacheEntry::from_record(&bytes).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn as_i64_only_reads_integers() {
        assert_eq!(CacheValue::from(41).as_i64(), Some(41));
        assert_eq!(CacheValue::from("41").as_i64(), None);
        assert_eq!(CacheValue::Bytes(vec![41]).as_i64(), None);
    }

    #[test]
    fn ttl_resolution() {
        assert_eq!(Ttl::Default.resolve(Some(300)), Some(300));
        assert_eq!(Ttl::Default.resolve(None), None);
        assert_eq!(Ttl::Never.resolve(Some(300)), None);
        assert_eq!(Ttl::Seconds(5).resolve(Some(300)), Some(5));
    }
}
