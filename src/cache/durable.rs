use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{CacheEntry, CacheError, CacheKey, CacheTier};

/// SQLite-backed durable tier.
///
/// One connection guarded by a mutex serializes writers; each statement is a
/// single upsert or delete, so readers never see a half-written entry. When
/// the database cannot be opened the tier is created in a degraded state in
/// which every operation reports [`CacheError::Unavailable`].
pub struct SqliteTier {
    conn: Option<Arc<Mutex<Connection>>>,
}

impl SqliteTier {
    /// Open or create the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Some(Arc::new(Mutex::new(conn))),
        })
    }

    /// Open the database, or fall back to a degraded tier that misses on
    /// every lookup. Never fails.
    pub fn open_or_degraded(path: &Path) -> Self {
        match Self::open(path) {
            Ok(tier) => tier,
            Err(e) => {
                tracing::warn!(
                    "Durable cache at {} unavailable, continuing without it: {e}",
                    path.display()
                );
                Self::degraded()
            }
        }
    }

    fn degraded() -> Self {
        Self { conn: None }
    }

    /// In-memory database (for tests).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Some(Arc::new(Mutex::new(conn))),
        })
    }

    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone().ok_or(CacheError::Unavailable)?;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| CacheError::Poisoned)?;
            f(&conn).map_err(CacheError::from)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            inserted_at INTEGER NOT NULL,
            last_access INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cache_inserted_at ON cache(inserted_at);",
    )
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

#[async_trait]
impl CacheTier for SqliteTier {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let raw_key = key.as_str().to_string();
        let now = Utc::now().timestamp();
        let row = self
            .with_conn(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT value, inserted_at FROM cache WHERE key = ?1",
                        params![raw_key],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?;
                if row.is_some() {
                    conn.execute(
                        "UPDATE cache SET last_access = ?1 WHERE key = ?2",
                        params![now, raw_key],
                    )?;
                }
                Ok(row)
            })
            .await?;

        Ok(row.map(|(value, inserted_at)| CacheEntry {
            key: key.clone(),
            value,
            inserted_at: from_timestamp(inserted_at),
            last_access: from_timestamp(now),
        }))
    }

    async fn put(&self, key: &CacheKey, value: &str) -> Result<(), CacheError> {
        let raw_key = key.as_str().to_string();
        let value = value.to_string();
        let now = Utc::now().timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cache (key, value, inserted_at, last_access)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    inserted_at = excluded.inserted_at,
                    last_access = excluded.last_access",
                params![raw_key, value, now],
            )
            .map(|_| ())
        })
        .await
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let raw_key = key.as_str().to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM cache WHERE key = ?1", params![raw_key])
                .map(|_| ())
        })
        .await
    }

    async fn remove_older_than(&self, max_age: Duration) -> Result<usize, CacheError> {
        let age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp().saturating_sub(age);
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM cache WHERE inserted_at < ?1", params![cutoff])
        })
        .await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| conn.execute("DELETE FROM cache", []).map(|_| ()))
            .await
    }

    async fn len(&self) -> Result<u64, CacheError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get::<_, i64>(0))
        })
        .await
        .map(|n| n.max(0) as u64)
    }
}

#[cfg(test)]
impl SqliteTier {
    /// Rewrite an entry's insertion time (for age-based cleanup tests).
    pub(crate) async fn backdate(&self, key: &CacheKey, age: Duration) -> Result<(), CacheError> {
        let raw_key = key.as_str().to_string();
        let inserted_at = Utc::now().timestamp() - age.as_secs() as i64;
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE cache SET inserted_at = ?1 WHERE key = ?2",
                params![inserted_at, raw_key],
            )
            .map(|_| ())
        })
        .await
    }
}
