use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use zotag_common::Result;

use super::QueryCache;
use crate::client::ItemVersions;
use crate::tags::CacheKey;

/// In-memory query cache
#[derive(Default)]
pub struct MemoryQueryCache {
    entries: RwLock<HashMap<CacheKey, ItemVersions>>,
}

impl MemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryCache for MemoryQueryCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<ItemVersions>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn store(&self, key: &CacheKey, items: &ItemVersions) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.clone(), items.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.entries.read().await.len() as u64)
    }
}
