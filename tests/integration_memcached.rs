//! Contract tests for the distributed-memory backend
//!
//! These require a running Memcached instance (`MEMCACHED_URL` or
//! localhost:11211) and are ignored by default:
//!
//! ```text
//! cargo test --test integration_memcached -- --ignored
//! ```

mod common;

use common::*;
use multi_backend_cache::{
    BackendConfig, CacheBackend, CacheError, CacheValue, Ttl, create_cache_backend,
};
use std::sync::Arc;
use std::time::Duration;

async fn memcached_backend() -> Arc<dyn CacheBackend> {
    init_tracing();
    create_cache_backend("distributed-memory", &BackendConfig::default())
        .await
        .expect("Memcached must be reachable for these tests")
}

#[tokio::test]
#[ignore = "requires a running Memcached instance"]
async fn set_and_get_round_trip() {
    let cache = memcached_backend().await;
    let key = test_key("roundtrip");

    // Everything travels through the binary envelope on this backend.
    let structural = CacheValue::from(test_data::json_kitchen_sink());
    assert!(cache.set(&key, structural.clone(), Ttl::Seconds(60)).await);
    assert_eq!(cache.get(&key).await, Some(structural));

    let opaque = CacheValue::Bytes(vec![0x00, 0x01, 0xfe, 0xff]);
    assert!(cache.set(&key, opaque.clone(), Ttl::Seconds(60)).await);
    assert_eq!(cache.get(&key).await, Some(opaque));

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Memcached instance"]
async fn expiry_invariant() {
    let cache = memcached_backend().await;
    let key = test_key("expiry");

    assert!(cache.set(&key, CacheValue::from(1), Ttl::Seconds(1)).await);
    assert!(cache.exists(&key).await);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(!cache.exists(&key).await);
}

#[tokio::test]
#[ignore = "requires a running Memcached instance"]
async fn key_enumeration_is_unsupported() {
    let cache = memcached_backend().await;
    let key = test_key("enumeration");

    assert!(cache.set(&key, CacheValue::from(1), Ttl::Seconds(60)).await);
    // The protocol cannot enumerate keys: empty list, logged warning.
    assert!(cache.keys("*").await.is_empty());

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Memcached instance"]
async fn ttl_is_not_introspectable() {
    let cache = memcached_backend().await;
    let key = test_key("ttl");

    assert!(cache.set(&key, CacheValue::from(1), Ttl::Seconds(60)).await);
    assert_eq!(cache.ttl(&key).await, -1, "present keys read as never-expiring");
    assert_eq!(cache.ttl(&test_key("absent")).await, -2);

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Memcached instance"]
async fn incr_initializes_then_increments() {
    let cache = memcached_backend().await;
    let key = test_key("counter");

    // Absent key: initialized to zero, then incremented (two round trips).
    assert_eq!(cache.incr(&key, 5).await.unwrap(), 5);
    assert_eq!(cache.incr(&key, 1).await.unwrap(), 6);
    assert_eq!(cache.get(&key).await, Some(CacheValue::from(6)));

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Memcached instance"]
async fn incr_rejects_enveloped_values() {
    let cache = memcached_backend().await;
    let key = test_key("words");

    assert!(cache.set(&key, CacheValue::from("not a number"), Ttl::Seconds(60)).await);
    let err = cache.incr(&key, 1).await.expect_err("must re-raise");
    assert!(matches!(err, CacheError::NotANumber { .. }));

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Memcached instance"]
async fn expire_uses_native_touch() {
    let cache = memcached_backend().await;
    let key = test_key("touch");

    assert!(cache.set(&key, CacheValue::from(1), Ttl::Seconds(1)).await);
    assert!(cache.expire(&key, 60).await);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(cache.exists(&key).await, "touch kept the key alive");

    assert!(!cache.expire(&test_key("absent"), 60).await);

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Memcached instance"]
async fn info_and_health() {
    let cache = memcached_backend().await;

    assert!(cache.health_check().await);
    assert_eq!(cache.cleanup_expired().await, 0);

    let info = cache.get_info().await;
    assert_eq!(info["backend"], "distributed-memory");
    assert_eq!(info["status"], "connected");
    assert!(info["total_items"].is_number());
}
