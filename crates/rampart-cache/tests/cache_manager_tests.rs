//! End-to-end behavior of the cache manager over an in-process store.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{CountingLoader, init_tracing, local_cache, peer, shared_cache, shared_filter};
use rampart_cache::{CacheSettings, LockRetry, MembershipFilter};
use rampart_core::NULL_MARKER;
use rampart_store::KeyValueStore;

#[tokio::test]
async fn test_unknown_key_short_circuits_and_known_key_loads_once() {
    let (store, cache) = shared_cache(CacheSettings::default());
    shared_filter(&store).insert("sku:42").await.unwrap();
    let loader = CountingLoader::new();

    let missing: Option<u64> = cache
        .get_or_load("sku:999", || loader.fetch("sku:999"))
        .await
        .unwrap();
    assert!(missing.is_none());
    assert_eq!(loader.calls(), 0);
    assert!(!store.exists("sku:999").await.unwrap());

    let first: Option<u64> = cache
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();
    assert_eq!(first, Some(1999));
    assert_eq!(loader.calls(), 1);

    let ttl = store.ttl("sku:42").await.unwrap();
    assert!((300..=330).contains(&ttl), "ttl was {}", ttl);
    assert!(!store.exists("lock:sku:42").await.unwrap());

    let second: Option<u64> = cache
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();
    assert_eq!(second, Some(1999));
    assert_eq!(loader.calls(), 1);

    let snapshot = cache.metrics().snapshot();
    assert_eq!(snapshot.filter_rejections, 1);
    assert_eq!(snapshot.loads, 1);
    assert_eq!(snapshot.remote_hits, 1);
}

#[tokio::test]
async fn test_null_result_suppresses_reloads() {
    let (store, cache) = local_cache(CacheSettings::default());
    let loader = CountingLoader::new();

    for _ in 0..3 {
        let value: Option<u64> = cache
            .get_or_load("sku:7", || loader.fetch("sku:7"))
            .await
            .unwrap();
        assert!(value.is_none());
    }

    assert_eq!(loader.calls(), 1);
    assert_eq!(store.get("sku:7").await.unwrap(), Some(NULL_MARKER.to_vec()));
    assert_eq!(cache.metrics().snapshot().null_cached, 1);
}

#[tokio::test]
async fn test_set_get_roundtrip() {
    let (_, cache) = local_cache(CacheSettings::default());

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Product {
        sku: String,
        price: u64,
    }

    let product = Product {
        sku: "sku:42".to_string(),
        price: 1999,
    };
    cache
        .set_with_ttl("product:42", &product, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(cache.get::<Product>("product:42").await, Some(product));
    assert_eq!(cache.get_expire("product:42").await, 10);
}

#[tokio::test]
async fn test_set_registers_key_with_filter() {
    let (store, cache) = shared_cache(CacheSettings::default());
    shared_filter(&store).insert("sku:1").await.unwrap();

    cache.set("sku:2", &2u64).await.unwrap();
    assert_eq!(cache.delete(&["sku:2"]).await, 1);
    let loader = CountingLoader::new();

    // Admitted after the value itself is gone, so the loader runs
    let _: Option<u64> = cache
        .get_or_load("sku:2", || loader.fetch("sku:2"))
        .await
        .unwrap();
    assert_eq!(loader.calls(), 1);
    assert!(cache.filter().may_contain("sku:2").await);
}

#[tokio::test]
async fn test_store_outage_serves_from_mirror() {
    init_tracing();
    let (store, cache) = local_cache(CacheSettings::default());
    store.set_available(false);

    cache.set("sku:42", &1999u64).await.unwrap();
    assert_eq!(cache.get::<u64>("sku:42").await, Some(1999));
    assert!(
        !cache
            .lock()
            .try_lock("lock:any", "token", Duration::from_secs(5))
            .await
    );
    assert_eq!(cache.delete(&["sku:42"]).await, 0);
    assert!(cache.get::<u64>("sku:42").await.is_none());
}

#[tokio::test]
async fn test_store_outage_loads_without_lock() {
    init_tracing();
    let (store, cache) = shared_cache(CacheSettings::default());
    store.set_available(false);
    let loader = CountingLoader::new();

    for _ in 0..2 {
        let value: Option<u64> = cache
            .get_or_load("sku:42", || loader.fetch("sku:42"))
            .await
            .unwrap();
        assert_eq!(value, Some(1999));
    }

    // Second call is answered by the mirror
    assert_eq!(loader.calls(), 1);
    assert!(cache.metrics().snapshot().degraded > 0);

    store.set_available(true);
    assert!(!store.exists("sku:42").await.unwrap());
}

#[tokio::test]
async fn test_key_loaded_during_outage_is_admitted_after_recovery() {
    init_tracing();
    let (store, cache) = shared_cache(CacheSettings::default());
    cache.set("sku:1", &1u64).await.unwrap();
    let loader = CountingLoader::new();

    store.set_available(false);
    let value: Option<u64> = cache
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();
    assert_eq!(value, Some(1999));
    store.set_available(true);

    assert_eq!(cache.get::<u64>("sku:42").await, Some(1999));
    let value: Option<u64> = cache
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();
    assert_eq!(value, Some(1999));
    assert_eq!(loader.calls(), 1);

    // The next successful filter write drains the backlog for every peer
    cache.set("sku:2", &2u64).await.unwrap();
    assert_eq!(cache.filter_backlog_len(), 0);
    assert!(shared_filter(&store).may_contain("sku:42").await);
}

#[tokio::test]
async fn test_remote_value_wins_over_mirror() {
    let (store, cache) = local_cache(CacheSettings::default());
    cache.set("sku:42", &1u64).await.unwrap();

    store.set("sku:42", b"2", None).await.unwrap();

    assert_eq!(cache.get::<u64>("sku:42").await, Some(2));
}

#[tokio::test]
async fn test_peers_share_values_and_filter() {
    let (store, first) = shared_cache(CacheSettings::default());
    let second = peer(&store, CacheSettings::default());
    let loader = CountingLoader::new();

    let loaded: Option<u64> = first
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();
    assert_eq!(loaded, Some(1999));

    let seen: Option<u64> = second
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();
    assert_eq!(seen, Some(1999));

    let unknown: Option<u64> = second
        .get_or_load("sku:999", || loader.fetch("sku:999"))
        .await
        .unwrap();
    assert!(unknown.is_none());
    assert_eq!(loader.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_load_once() {
    init_tracing();
    let settings = CacheSettings {
        lock_retry: LockRetry {
            attempts: 100,
            interval: Duration::from_millis(10),
        },
        ..CacheSettings::default()
    };
    let (_, cache) = local_cache(settings);
    let loader = CountingLoader::with_delay(Duration::from_millis(100));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let loader = loader.clone();
        tasks.push(tokio::spawn(async move {
            cache
                .get_or_load::<u64, _, _, _>("sku:42", || loader.fetch("sku:42"))
                .await
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Some(1999));
    }
    assert_eq!(loader.calls(), 1);
    assert!(cache.metrics().snapshot().lock_contention > 0);
}

#[tokio::test]
async fn test_lost_lock_race_fails_fast_when_configured() {
    let settings = CacheSettings {
        lock_retry: LockRetry::FAIL_FAST,
        ..CacheSettings::default()
    };
    let (store, cache) = local_cache(settings);
    assert!(
        cache
            .lock()
            .try_lock("lock:sku:42", "other-instance", Duration::from_secs(30))
            .await
    );
    let loader = CountingLoader::new();

    let value: Option<u64> = cache
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();

    assert!(value.is_none());
    assert_eq!(loader.calls(), 0);
    assert!(store.exists("lock:sku:42").await.unwrap());
}

#[tokio::test]
async fn test_custom_lock_prefix() {
    let settings = CacheSettings {
        lock_prefix: "load-lock:".to_string(),
        lock_retry: LockRetry::FAIL_FAST,
        ..CacheSettings::default()
    };
    let (_, cache) = local_cache(settings);
    assert!(
        cache
            .lock()
            .try_lock("load-lock:sku:42", "other-instance", Duration::from_secs(30))
            .await
    );
    let loader = CountingLoader::new();

    let _: Option<u64> = cache
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();

    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn test_backfill_admits_existing_keys() {
    let (store, cache) = shared_cache(CacheSettings::default());
    let keys: Vec<String> = (0..50).map(|i| format!("sku:{}", i)).collect();

    assert_eq!(cache.backfill(&keys).await.unwrap(), 50);
    assert!(cache.filter().is_populated().await);

    let loader = CountingLoader::new();
    let _: Option<u64> = cache
        .get_or_load("sku:42", || loader.fetch("sku:42"))
        .await
        .unwrap();
    assert_eq!(loader.calls(), 1);

    store.set_available(false);
    assert!(cache.backfill(&keys).await.is_err());
}

#[tokio::test]
async fn test_expire_and_persist() {
    let (_, cache) = local_cache(CacheSettings::default());
    cache.set("sku:42", &1u64).await.unwrap();

    assert!(cache.expire("sku:42", Duration::ZERO).await);
    assert_eq!(cache.get_expire("sku:42").await, -1);
    assert!(cache.expire("sku:42", Duration::from_secs(5)).await);
    assert_eq!(cache.get_expire("sku:42").await, 5);
}

#[tokio::test]
async fn test_shared_metrics_recorder() {
    let metrics = rampart_cache::CacheMetrics::new();
    let store = Arc::new(rampart_store::MemoryStore::new());
    let cache = rampart_cache::CacheManager::builder(store)
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let _ = cache.get::<u64>("sku:1").await;

    assert_eq!(metrics.snapshot().misses, 1);
}

#[test]
fn test_invalid_settings_rejected_by_builder() {
    let settings = CacheSettings {
        jitter_ratio: 2.0,
        ..CacheSettings::default()
    };
    let store = Arc::new(rampart_store::MemoryStore::new());

    let result = rampart_cache::CacheManager::builder(store)
        .settings(settings)
        .build();

    assert!(result.unwrap_err().is_validation_error());
}
