//! Store-backed Bloom filter shared by every instance.

use std::time::Duration;

use async_trait::async_trait;
use rampart_core::BloomParams;
use rampart_core::keys::filter_key;
use rampart_core::ttl::FILTER_TTL;
use rampart_store::{SharedStore, StoreError};
use tracing::{debug, warn};

use super::MembershipFilter;

/// Bloom filter whose bits live in the shared store.
///
/// Any number of named filters can share one store; names are prefixed
/// with `bloom:` unless they already carry it. Each add refreshes the
/// field's lifetime.
pub struct RemoteFilter {
    store: SharedStore,
    params: BloomParams,
    ttl: Duration,
    name: String,
}

impl RemoteFilter {
    /// Creates a filter with default sizing, bound to `name` for
    /// [`MembershipFilter`] calls.
    pub fn new(store: SharedStore, name: &str) -> Self {
        Self {
            store,
            params: BloomParams::DEFAULT,
            ttl: FILTER_TTL,
            name: filter_key(name),
        }
    }

    pub fn with_params(mut self, params: BloomParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the lifetime applied on every add.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Adds `value` to the filter `name`.
    pub async fn add(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let key = filter_key(name);
        self.store.set_bits(&key, &self.params.positions(value)).await?;
        self.store.expire(&key, self.ttl).await?;
        Ok(())
    }

    /// Adds every value with one batched write.
    pub async fn add_all<S: AsRef<str>>(&self, name: &str, values: &[S]) -> Result<(), StoreError> {
        if values.is_empty() {
            return Ok(());
        }
        let key = filter_key(name);
        let positions: Vec<u64> = values
            .iter()
            .flat_map(|value| self.params.positions(value.as_ref()))
            .collect();
        self.store.set_bits(&key, &positions).await?;
        self.store.expire(&key, self.ttl).await?;
        debug!(filter = %key, count = values.len(), "Added values to filter");
        Ok(())
    }

    /// Returns false only if `value` was never added to `name`.
    pub async fn might_contain(&self, name: &str, value: &str) -> Result<bool, StoreError> {
        let bits = self
            .store
            .get_bits(&filter_key(name), &self.params.positions(value))
            .await?;
        Ok(bits.into_iter().all(|bit| bit))
    }

    /// Deletes the filter `name`.
    pub async fn clear(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete(&[filter_key(name)]).await?;
        Ok(removed > 0)
    }

    /// Returns whether the filter `name` holds any bits.
    pub async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        self.store.exists(&filter_key(name)).await
    }

    pub fn params(&self) -> BloomParams {
        self.params
    }

    /// The bound filter key.
    pub fn key(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl MembershipFilter for RemoteFilter {
    async fn insert(&self, key: &str) -> Result<(), StoreError> {
        self.add(&self.name, key).await
    }

    async fn insert_all(&self, keys: &[String]) -> Result<(), StoreError> {
        self.add_all(&self.name, keys).await
    }

    async fn may_contain(&self, key: &str) -> bool {
        match self.might_contain(&self.name, key).await {
            Ok(true) => true,
            // A negative only counts once the field exists
            Ok(false) => match self.exists(&self.name).await {
                Ok(exists) => !exists,
                Err(e) => {
                    warn!(filter = %self.name, error = %e, "Filter existence check failed");
                    true
                },
            },
            Err(e) => {
                warn!(filter = %self.name, key = %key, error = %e, "Filter lookup failed");
                true
            },
        }
    }

    async fn is_populated(&self) -> bool {
        match self.exists(&self.name).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(filter = %self.name, error = %e, "Filter existence check failed");
                false
            },
        }
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.clear(&self.name).await.map(|_| ())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for RemoteFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFilter")
            .field("store", &self.store.name())
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_store::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    fn filter() -> (Arc<MemoryStore>, RemoteFilter) {
        let store = Arc::new(MemoryStore::new());
        let filter = RemoteFilter::new(store.clone(), "products");
        (store, filter)
    }

    #[tokio::test]
    async fn test_add_and_check() {
        let (_, filter) = filter();
        filter.add("products", "sku:42").await.unwrap();

        assert!(filter.might_contain("products", "sku:42").await.unwrap());
        assert!(!filter.might_contain("orders", "sku:42").await.unwrap());
    }

    #[tokio::test]
    async fn test_names_are_prefixed_once() {
        let (store, filter) = filter();
        filter.add("bloom:products", "sku:1").await.unwrap();

        assert!(store.exists("bloom:products").await.unwrap());
        assert!(filter.might_contain("products", "sku:1").await.unwrap());
        assert_eq!(filter.key(), "bloom:products");
    }

    #[tokio::test]
    async fn test_add_refreshes_lifetime() {
        let (store, filter) = filter();
        filter.add("products", "sku:1").await.unwrap();

        let ttl = store.ttl("bloom:products").await.unwrap();
        assert!(ttl > 29 * 24 * 3600, "ttl was {}", ttl);
    }

    #[tokio::test]
    async fn test_add_all_is_one_batch() {
        let (store, filter) = filter();
        let keys: Vec<String> = (0..100).map(|i| format!("sku:{}", i)).collect();

        let before = store.command_count();
        filter.add_all("products", &keys).await.unwrap();

        // set_bits + expire
        assert_eq!(store.command_count() - before, 2);
        for key in &keys {
            assert!(filter.might_contain("products", key).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_clear_and_exists() {
        let (_, filter) = filter();
        assert!(!filter.exists("products").await.unwrap());

        filter.add("products", "sku:1").await.unwrap();
        assert!(filter.exists("products").await.unwrap());

        assert!(filter.clear("products").await.unwrap());
        assert!(!filter.exists("products").await.unwrap());
        assert!(!filter.might_contain("products", "sku:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_trait_admits_when_cold_or_unreachable() {
        let (store, filter) = filter();
        assert!(filter.may_contain("sku:404").await);
        assert!(!filter.is_populated().await);

        filter.insert("sku:1").await.unwrap();
        assert!(filter.is_populated().await);
        assert!(filter.may_contain("sku:1").await);

        store.set_available(false);
        assert!(filter.may_contain("sku:404").await);
        assert!(filter.insert("sku:2").await.is_err());
    }
}
