//! Two-tier cache for summaries: a bounded in-memory LRU in front of a
//! durable SQLite table that survives restarts.
//!
//! Durable-tier failures never propagate out of [`CacheStore`]; they degrade
//! to misses and are logged.

mod durable;
mod memory;
mod store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::issue::Issue;

pub use durable::SqliteTier;
pub use memory::MemoryTier;
pub use store::{CacheStats, CacheStore, Fetched, Origin};

/// Content fingerprint of an issue plus the summarization context.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for an issue summary. Covers everything that feeds the prompt, the
    /// issue's last update, the model, and the prompt template.
    pub fn for_summary(issue: &Issue, model: &str, prompt_template: &str) -> Self {
        // serde_json maps are sorted by key, which keeps the digest stable.
        let data = serde_json::json!({
            "number": issue.number,
            "title": issue.title,
            "body": issue.body,
            "labels": issue.labels,
            "updated_at": issue.updated_at.to_rfc3339(),
            "model": model,
            "prompt_hash": sha256_hex(prompt_template.as_bytes()),
        });
        Self(format!("summary:{}", sha256_hex(data.to_string().as_bytes())))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A durable-tier record.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: String,
    pub inserted_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("durable cache unavailable")]
    Unavailable,
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache connection lock poisoned")]
    Poisoned,
    #[error("cache task failed: {0}")]
    Task(String),
}

/// A persistent key-value backend behind the in-memory tier.
///
/// Writes must be atomic from a reader's point of view.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or replace.
    async fn put(&self, key: &CacheKey, value: &str) -> Result<(), CacheError>;

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Delete entries inserted more than `max_age` ago. Returns how many went.
    async fn remove_older_than(&self, max_age: Duration) -> Result<usize, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    async fn len(&self) -> Result<u64, CacheError>;
}
