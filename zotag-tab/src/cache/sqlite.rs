use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use zotag_common::Result;

use super::QueryCache;
use crate::client::ItemVersions;
use crate::tags::CacheKey;

/// Persistent query cache backed by the `query_cache` table
///
/// Rows are addressed by the SHA-256 digest of the canonical key. Each
/// statement is atomic in SQLite, so `clear` never interleaves with a
/// half-written `store`.
#[derive(Clone)]
pub struct SqliteQueryCache {
    pool: SqlitePool,
}

impl SqliteQueryCache {
    /// Wrap a pool whose schema is already initialized
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and its schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = zotag_common::db::init_database(db_path).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueryCache for SqliteQueryCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<ItemVersions>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT items FROM query_cache WHERE key_hash = ?")
                .bind(key.digest())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((items,)) => Ok(Some(serde_json::from_str(&items)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, key: &CacheKey, items: &ItemVersions) -> Result<()> {
        let encoded = serde_json::to_string(items)?;

        // Last store wins when two processes race on the same key
        sqlx::query(
            r#"
            INSERT INTO query_cache (key_hash, tag_set, items, item_count, cached_at)
            VALUES (?, ?, ?, ?, datetime('now'))
            ON CONFLICT(key_hash) DO UPDATE SET
                tag_set = excluded.tag_set,
                items = excluded.items,
                item_count = excluded.item_count,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(key.digest())
        .bind(key.as_str())
        .bind(encoded)
        .bind(items.len() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM query_cache")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
