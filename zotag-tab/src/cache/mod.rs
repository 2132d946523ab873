//! Query cache
//!
//! Maps a canonical `CacheKey` to the item versions last fetched for it.
//! Entries never expire; `clear` is the only invalidation. Backends:
//! - `MemoryQueryCache`: process-local map (tests, ephemeral runs)
//! - `SqliteQueryCache`: persistent table shared across processes

mod memory;
mod sqlite;

pub use memory::MemoryQueryCache;
pub use sqlite::SqliteQueryCache;

use async_trait::async_trait;
use zotag_common::Result;

use crate::client::ItemVersions;
use crate::tags::CacheKey;

/// Key/value store for resolved tag-set queries
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Stored result for `key`, if any
    async fn lookup(&self, key: &CacheKey) -> Result<Option<ItemVersions>>;

    /// Store (or replace) the result for `key`
    async fn store(&self, key: &CacheKey, items: &ItemVersions) -> Result<()>;

    /// Remove every entry; returns how many were removed
    async fn clear(&self) -> Result<u64>;

    /// Number of stored entries
    async fn len(&self) -> Result<u64>;
}
