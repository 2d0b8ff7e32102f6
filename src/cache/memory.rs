use std::future::Future;
use std::sync::Arc;

use moka::future::Cache;
use moka::policy::EvictionPolicy;

use super::CacheKey;

/// Size-bounded in-memory tier. Evicts the least-recently-used entry once
/// `max_items` is exceeded and coalesces concurrent initializations of the
/// same key into one.
#[derive(Clone)]
pub struct MemoryTier {
    cache: Cache<CacheKey, String>,
}

impl MemoryTier {
    pub fn new(max_items: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_items)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, value: String) {
        self.cache.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.cache.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Presence check that does not count as an access.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending bookkeeping (evictions, recency updates) now.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Return the cached value, or run `init` and cache its `Ok` output.
    /// Callers racing on the same key share a single `init` run; an `Err` is
    /// handed to every waiter and nothing is cached.
    pub async fn get_or_try_insert_with<F, E>(&self, key: CacheKey, init: F) -> Result<String, Arc<E>>
    where
        F: Future<Output = Result<String, E>>,
        E: Send + Sync + 'static,
    {
        self.cache.try_get_with(key, init).await
    }
}
