//! Cache invalidation with pattern matching support.

use glob::Pattern;
use tracing::{debug, info, warn};

use super::CacheManager;

/// Resultado de una operación de invalidación.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationResult {
    /// Patrones aplicados.
    pub patterns: Vec<String>,
    /// Keys removed from the remote store.
    pub remote: u64,
    /// Entries removed from the local mirror.
    pub local: usize,
}

impl InvalidationResult {
    fn empty(pattern: &str) -> Self {
        Self {
            patterns: vec![pattern.to_string()],
            ..Self::default()
        }
    }
}

impl CacheManager {
    /// Invalida entradas usando un patrón glob.
    ///
    /// The store is scanned for matching keys, which are then deleted;
    /// the mirror is filtered with the same pattern. Soporta `*`, `?` y
    /// clases `[..]`.
    ///
    /// If the store cannot be reached the mirror is still cleared and the
    /// remote count is zero.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use rampart_cache::CacheManager;
    /// # use rampart_store::MemoryStore;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let cache = CacheManager::builder(Arc::new(MemoryStore::new())).build().unwrap();
    /// // Invalida todos los precios
    /// let result = cache.delete_by_pattern("price:*").await;
    /// println!("Invalidated {} remote keys", result.remote);
    /// # }
    /// ```
    pub async fn delete_by_pattern(&self, pattern_str: &str) -> InvalidationResult {
        let pattern = match Pattern::new(pattern_str) {
            Ok(p) => p,
            Err(e) => {
                debug!(pattern = %pattern_str, error = %e, "Invalid glob pattern");
                return InvalidationResult::empty(pattern_str);
            },
        };

        let remote = match self.delete_remote_matching(pattern_str).await {
            Ok(removed) => removed,
            Err(e) => {
                self.metrics().record_degraded("delete_by_pattern");
                warn!(pattern = %pattern_str, error = %e, "Remote pattern delete failed");
                0
            },
        };

        let local = self.mirror().remove_matching(&pattern);
        self.metrics().update_mirror_entries(self.mirror().len());

        info!(
            pattern = %pattern_str,
            remote = remote,
            local = local,
            "Cache entries invalidated by pattern"
        );

        InvalidationResult {
            patterns: vec![pattern_str.to_string()],
            remote,
            local,
        }
    }

    /// Invalida múltiples patrones a la vez.
    pub async fn delete_by_patterns(&self, patterns: &[&str]) -> InvalidationResult {
        let mut total = InvalidationResult::default();

        for pattern_str in patterns {
            let result = self.delete_by_pattern(pattern_str).await;
            total.remote += result.remote;
            total.local += result.local;
            total.patterns.extend(result.patterns);
        }

        total
    }

    async fn delete_remote_matching(
        &self,
        pattern: &str,
    ) -> Result<u64, rampart_store::StoreError> {
        let keys = self.store().keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.store().delete(&keys).await
    }
}
