use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::CacheConfig;

use super::{CacheKey, CacheTier, MemoryTier, SqliteTier};

/// Where a value returned by [`CacheStore::get_or_try_insert_with`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Memory,
    /// Durable hit, promoted into memory.
    Durable,
    /// Produced by the initializer and written to both tiers.
    Computed,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub value: String,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_entries: u64,
    /// `None` when the durable tier is unavailable.
    pub durable_entries: Option<u64>,
}

/// Read-through, write-through composition of the two tiers.
pub struct CacheStore<D = SqliteTier> {
    memory: MemoryTier,
    durable: Arc<D>,
    max_age: Duration,
}

impl<D> Clone for CacheStore<D> {
    fn clone(&self) -> Self {
        Self {
            memory: self.memory.clone(),
            durable: Arc::clone(&self.durable),
            max_age: self.max_age,
        }
    }
}

impl CacheStore<SqliteTier> {
    /// Open the store described by `config`. A durable tier that cannot be
    /// opened (missing permissions, corrupted file) leaves a memory-only store.
    pub fn open(config: &CacheConfig) -> Self {
        let durable = SqliteTier::open_or_degraded(&config.db_path);
        Self::with_durable(durable, config)
    }
}

impl<D: CacheTier + 'static> CacheStore<D> {
    pub fn with_durable(durable: D, config: &CacheConfig) -> Self {
        Self {
            memory: MemoryTier::new(config.max_memory_items),
            durable: Arc::new(durable),
            max_age: Duration::from_secs(config.cleanup_interval_secs),
        }
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    /// Memory first, then durable; a durable hit is promoted into memory.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        if let Some(value) = self.memory.get(key).await {
            return Some(value);
        }
        let value = self.durable_get(key).await?;
        self.memory.insert(key.clone(), value.clone()).await;
        Some(value)
    }

    /// Write to both tiers. A durable failure leaves the memory entry in place.
    pub async fn put(&self, key: &CacheKey, value: String) {
        self.durable_put(key, &value).await;
        self.memory.insert(key.clone(), value).await;
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.memory.invalidate(key).await;
        if let Err(e) = self.durable.remove(key).await {
            tracing::warn!("Failed to remove {key} from durable cache: {e}");
        }
    }

    /// Drop durable entries older than the cleanup interval. The memory tier
    /// is size-bounded only and is left alone. Returns `None` when the
    /// durable tier could not be reached.
    pub async fn cleanup(&self) -> Option<usize> {
        match self.durable.remove_older_than(self.max_age).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!("Cleaned up {removed} expired cache entries");
                }
                Some(removed)
            }
            Err(e) => {
                tracing::warn!("Durable cache cleanup failed: {e}");
                None
            }
        }
    }

    /// Empty both tiers. Returns `false` when the durable tier could not be
    /// reached; the memory tier is cleared regardless.
    pub async fn clear(&self) -> bool {
        self.memory.clear();
        match self.durable.clear().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to clear durable cache: {e}");
                false
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.memory.sync().await;
        CacheStats {
            memory_entries: self.memory.entry_count(),
            durable_entries: self.durable.len().await.ok(),
        }
    }

    /// Look `key` up in both tiers, or run `init` and store its output.
    ///
    /// At most one `init` runs per key at a time: concurrent callers for the
    /// same key wait for the in-flight one and share its outcome. Errors are
    /// shared the same way and nothing is cached for them.
    pub async fn get_or_try_insert_with<F, E>(
        &self,
        key: &CacheKey,
        init: F,
    ) -> Result<Fetched, Arc<E>>
    where
        F: Future<Output = Result<String, E>>,
        E: Send + Sync + 'static,
    {
        let mut origin = Origin::Memory;
        let value = self
            .memory
            .get_or_try_insert_with(key.clone(), async {
                if let Some(value) = self.durable_get(key).await {
                    origin = Origin::Durable;
                    return Ok(value);
                }
                let value = init.await?;
                self.durable_put(key, &value).await;
                origin = Origin::Computed;
                Ok::<_, E>(value)
            })
            .await?;

        Ok(Fetched { value, origin })
    }

    /// Run [`cleanup`](Self::cleanup) now and then once per cleanup interval
    /// until `cancel` fires.
    pub fn spawn_cleanup(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        let period = self.max_age.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        store.cleanup().await;
                    }
                }
            }
        })
    }

    async fn durable_get(&self, key: &CacheKey) -> Option<String> {
        match self.durable.get(key).await {
            Ok(entry) => entry.map(|e| e.value),
            Err(e) => {
                tracing::debug!("Durable cache miss for {key}: {e}");
                None
            }
        }
    }

    async fn durable_put(&self, key: &CacheKey, value: &str) {
        if let Err(e) = self.durable.put(key, value).await {
            tracing::debug!("Durable cache write skipped for {key}: {e}");
        }
    }
}
