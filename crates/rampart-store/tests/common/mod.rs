#![allow(dead_code)]
//! Behaviour every `KeyValueStore` must share, run against each backend.

use std::time::Duration;

use rampart_store::KeyValueStore;

/// Prefixes keys so runs against a shared Redis do not collide.
pub fn key(scope: &str, name: &str) -> String {
    format!("rampart-test:{}:{}", scope, name)
}

pub async fn set_get_roundtrip(store: &dyn KeyValueStore, scope: &str) {
    let k = key(scope, "value");
    store.set(&k, b"payload", Some(Duration::from_secs(30))).await.unwrap();

    assert_eq!(store.get(&k).await.unwrap(), Some(b"payload".to_vec()));
    assert!(store.exists(&k).await.unwrap());

    store.delete(&[k.clone()]).await.unwrap();
    assert_eq!(store.get(&k).await.unwrap(), None);
}

pub async fn set_if_absent_is_exclusive(store: &dyn KeyValueStore, scope: &str) {
    let k = key(scope, "nx");
    store.delete(&[k.clone()]).await.unwrap();
    let ttl = Duration::from_secs(10);

    assert!(store.set_if_absent(&k, b"first", ttl).await.unwrap());
    assert!(!store.set_if_absent(&k, b"second", ttl).await.unwrap());
    assert_eq!(store.get(&k).await.unwrap(), Some(b"first".to_vec()));

    let remaining = store.ttl(&k).await.unwrap();
    assert!((1..=10).contains(&remaining), "ttl was {}", remaining);

    store.delete(&[k]).await.unwrap();
}

pub async fn compare_and_delete_checks_value(store: &dyn KeyValueStore, scope: &str) {
    let k = key(scope, "cad");
    store.set(&k, b"owner-a", None).await.unwrap();

    assert!(!store.compare_and_delete(&k, b"owner-b").await.unwrap());
    assert!(store.exists(&k).await.unwrap());

    assert!(store.compare_and_delete(&k, b"owner-a").await.unwrap());
    assert!(!store.exists(&k).await.unwrap());
    assert!(!store.compare_and_delete(&k, b"owner-a").await.unwrap());
}

pub async fn bits_follow_store_order(store: &dyn KeyValueStore, scope: &str) {
    let k = key(scope, "bits");
    store.delete(&[k.clone()]).await.unwrap();

    assert!(!store.set_bit(&k, 7).await.unwrap());
    assert!(store.set_bit(&k, 7).await.unwrap());
    store.set_bits(&k, &[0, 1_000, 99_999]).await.unwrap();

    let bits = store.get_bits(&k, &[0, 1, 7, 1_000, 99_998, 99_999]).await.unwrap();
    assert_eq!(bits, vec![true, false, true, true, false, true]);

    // Bit 0 is the high bit of the first byte, bit 7 the low bit
    let raw = store.get(&k).await.unwrap().unwrap();
    assert_eq!(raw[0], 0b1000_0001);

    store.delete(&[k]).await.unwrap();
}

pub async fn counters_and_expiry(store: &dyn KeyValueStore, scope: &str) {
    let k = key(scope, "counter");
    store.delete(&[k.clone()]).await.unwrap();

    assert_eq!(store.incr_by(&k, 1).await.unwrap(), 1);
    assert_eq!(store.incr_by(&k, 2).await.unwrap(), 3);
    assert_eq!(store.incr_by(&k, -3).await.unwrap(), 0);

    assert_eq!(store.ttl(&k).await.unwrap(), -1);
    assert!(store.expire(&k, Duration::from_secs(45)).await.unwrap());
    let remaining = store.ttl(&k).await.unwrap();
    assert!((44..=45).contains(&remaining), "ttl was {}", remaining);

    store.delete(&[k.clone()]).await.unwrap();
    assert!(!store.expire(&k, Duration::from_secs(45)).await.unwrap());
    assert_eq!(store.ttl(&k).await.unwrap(), -2);
}

pub async fn keys_match_glob(store: &dyn KeyValueStore, scope: &str) {
    let entries: Vec<(String, Vec<u8>)> = ["sku:1", "sku:2", "order:1"]
        .iter()
        .map(|name| (key(scope, name), b"v".to_vec()))
        .collect();
    store
        .set_many(&entries, Some(Duration::from_secs(30)))
        .await
        .unwrap();

    let matched = store.keys(&key(scope, "sku:*")).await.unwrap();
    assert_eq!(matched, vec![key(scope, "sku:1"), key(scope, "sku:2")]);

    let all: Vec<String> = entries.into_iter().map(|(k, _)| k).collect();
    assert_eq!(store.delete(&all).await.unwrap(), 3);
}
