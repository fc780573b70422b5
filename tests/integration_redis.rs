//! Contract tests for the remote KV backend
//!
//! These require a running Redis instance (`REDIS_URL` or localhost:6379)
//! and are ignored by default:
//!
//! ```text
//! cargo test --test integration_redis -- --ignored
//! ```

mod common;

use common::*;
use multi_backend_cache::{
    BackendConfig, CacheBackend, CacheError, CacheValue, Ttl, create_cache_backend,
};
use std::collections::HashMap;
use std::sync::Arc;

async fn redis_backend() -> Arc<dyn CacheBackend> {
    init_tracing();
    create_cache_backend("remote-kv", &BackendConfig::default())
        .await
        .expect("Redis must be reachable for these tests")
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn set_and_get_round_trip() {
    let cache = redis_backend().await;
    let key = test_key("roundtrip");

    let structural = CacheValue::from(test_data::json_kitchen_sink());
    assert!(cache.set(&key, structural.clone(), Ttl::Seconds(60)).await);
    assert_eq!(cache.get(&key).await, Some(structural));

    let opaque = CacheValue::Bytes(vec![0x00, 0x01, 0xfe, 0xff]);
    assert!(cache.set(&key, opaque.clone(), Ttl::Seconds(60)).await);
    assert_eq!(cache.get(&key).await, Some(opaque));

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn concurrent_increments_are_atomic() {
    let cache = redis_backend().await;
    let key = test_key("atomic_counter");

    let mut handles = Vec::new();
    for _ in 0..100 {
        let cache = Arc::clone(&cache);
        let key = key.clone();
        handles.push(tokio::spawn(async move { cache.incr(&key, 1).await }));
    }
    for handle in handles {
        handle.await.expect("task").expect("incr");
    }

    // Incrementing by zero reads the final value atomically.
    assert_eq!(cache.incr(&key, 0).await.unwrap(), 100);

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn incr_rejects_non_numeric_values() {
    let cache = redis_backend().await;
    let key = test_key("words");

    assert!(cache.set(&key, CacheValue::from("not a number"), Ttl::Seconds(60)).await);
    let err = cache.incr(&key, 1).await.expect_err("must re-raise");
    assert!(matches!(err, CacheError::NotANumber { .. }));

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn native_ttl_introspection() {
    let cache = redis_backend().await;
    let timed = test_key("timed");
    let forever = test_key("forever");

    assert!(cache.set(&timed, CacheValue::from(1), Ttl::Seconds(60)).await);
    let remaining = cache.ttl(&timed).await;
    assert!((55..=60).contains(&remaining), "expected ~60s, got {remaining}");

    assert!(cache.set(&forever, CacheValue::from(1), Ttl::Never).await);
    assert_eq!(cache.ttl(&forever).await, -1);

    assert_eq!(cache.ttl(&test_key("absent")).await, -2);

    let _ = cache.delete(&timed).await;
    let _ = cache.delete(&forever).await;
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn expire_applies_server_side() {
    let cache = redis_backend().await;
    let key = test_key("expire");

    assert!(cache.set(&key, CacheValue::from(1), Ttl::Never).await);
    assert!(cache.expire(&key, 120).await);
    let remaining = cache.ttl(&key).await;
    assert!((115..=120).contains(&remaining), "expected ~120s, got {remaining}");

    assert!(!cache.expire(&test_key("absent"), 60).await);

    let _ = cache.delete(&key).await;
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn scan_matches_glob_patterns() {
    let cache = redis_backend().await;
    let prefix = test_key("scan");

    let user1 = format!("{prefix}:user:1");
    let user2 = format!("{prefix}:user:2");
    let session = format!("{prefix}:session:1");
    for key in [&user1, &user2, &session] {
        assert!(cache.set(key, CacheValue::from(1), Ttl::Seconds(60)).await);
    }

    let mut users = cache.keys(&format!("{prefix}:user:*")).await;
    users.sort();
    assert_eq!(users, vec![user1.clone(), user2.clone()]);

    for key in [&user1, &user2, &session] {
        let _ = cache.delete(key).await;
    }
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn mset_applies_batch_and_ttl() {
    let cache = redis_backend().await;
    let prefix = test_key("batch");

    let k1 = format!("{prefix}:1");
    let k2 = format!("{prefix}:2");
    let mut batch = HashMap::new();
    batch.insert(k1.clone(), CacheValue::from(test_data::json_user(1)));
    batch.insert(k2.clone(), CacheValue::from(2));
    assert!(cache.mset(batch, Ttl::Seconds(60)).await);

    let found = cache.mget(&[k1.clone(), k2.clone(), format!("{prefix}:missing")]).await;
    assert_eq!(found.len(), 2);

    // The second round trip applied the TTL to every batch member.
    for key in [&k1, &k2] {
        let remaining = cache.ttl(key).await;
        assert!((55..=60).contains(&remaining), "expected ~60s on {key}, got {remaining}");
    }

    for key in [&k1, &k2] {
        let _ = cache.delete(key).await;
    }
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn info_and_health() {
    let cache = redis_backend().await;

    assert!(cache.health_check().await);
    assert_eq!(cache.cleanup_expired().await, 0);

    let info = cache.get_info().await;
    assert_eq!(info["backend"], "remote-kv");
    assert_eq!(info["status"], "connected");
    assert!(info["total_items"].is_number());
}
