//! Cache-first tag-set resolution
//!
//! A key is fetched from the remote library only on a cache miss, and only
//! by one task at a time within the process: concurrent resolutions of the
//! same key queue on a per-key gate and re-check the cache once they hold it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::QueryCache;
use crate::client::{ItemVersions, RemoteQueryClient};
use crate::error::QueryError;
use crate::tags::{CacheKey, TagSet};

pub struct TagSetResolver {
    cache: Arc<dyn QueryCache>,
    client: Arc<dyn RemoteQueryClient>,
    in_flight: StdMutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl TagSetResolver {
    pub fn new(cache: Arc<dyn QueryCache>, client: Arc<dyn RemoteQueryClient>) -> Self {
        Self {
            cache,
            client,
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    /// Resolve a tag set through the cache, fetching on a miss
    pub async fn resolve(&self, tag_set: &TagSet) -> Result<ItemVersions, QueryError> {
        let key = tag_set.cache_key();

        if let Some(items) = self.cache.lookup(&key).await? {
            debug!(key = %key, items = items.len(), "Query cache hit");
            return Ok(items);
        }

        // Released on drop, so a cancelled resolve does not leave its gate behind
        let gate = GateHandle::acquire(self, key);
        let _lock = gate.gate.lock().await;
        self.resolve_locked(&gate.key, tag_set).await
    }

    async fn resolve_locked(
        &self,
        key: &CacheKey,
        tag_set: &TagSet,
    ) -> Result<ItemVersions, QueryError> {
        // Another task may have filled the entry while we waited
        if let Some(items) = self.cache.lookup(key).await? {
            debug!(key = %key, "Query cache filled while waiting");
            return Ok(items);
        }

        debug!(key = %key, "Query cache miss");
        let items = self.client.fetch(tag_set).await?;
        self.cache.store(key, &items).await?;

        Ok(items)
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<Mutex<()>>>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One task's hold on a per-key gate
struct GateHandle<'a> {
    resolver: &'a TagSetResolver,
    key: CacheKey,
    gate: Arc<Mutex<()>>,
}

impl<'a> GateHandle<'a> {
    fn acquire(resolver: &'a TagSetResolver, key: CacheKey) -> Self {
        let gate = resolver
            .in_flight()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self {
            resolver,
            key,
            gate,
        }
    }
}

impl Drop for GateHandle<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.resolver.in_flight();
        // Map entry + this handle: nobody else is waiting
        if Arc::strong_count(&self.gate) <= 2 {
            in_flight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryQueryCache;
    use crate::client::RemoteServiceError;
    use crate::tags::Filter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteQueryClient for SlowClient {
        async fn fetch(&self, _tag_set: &TagSet) -> Result<ItemVersions, RemoteServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok([("ITEM1".to_string(), 1)].into_iter().collect())
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_fetch_once() {
        let client = Arc::new(SlowClient {
            calls: AtomicUsize::new(0),
        });
        let resolver = Arc::new(TagSetResolver::new(
            Arc::new(MemoryQueryCache::new()),
            client.clone(),
        ));

        let tag_set = TagSet::with_filter(&["a", "b"], &Filter::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = resolver.clone();
            let tag_set = tag_set.clone();
            handles.push(tokio::spawn(async move { resolver.resolve(&tag_set).await }));
        }
        for handle in handles {
            let items = handle.await.unwrap().unwrap();
            assert_eq!(items.len(), 1);
        }

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(resolver.in_flight.lock().unwrap().is_empty());
    }

    struct HangingClient;

    #[async_trait]
    impl RemoteQueryClient for HangingClient {
        async fn fetch(&self, _tag_set: &TagSet) -> Result<ItemVersions, RemoteServiceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ItemVersions::new())
        }
    }

    #[tokio::test]
    async fn test_cancelled_resolutions_release_their_gates() {
        let resolver = Arc::new(TagSetResolver::new(
            Arc::new(MemoryQueryCache::new()),
            Arc::new(HangingClient),
        ));

        for i in 0..20 {
            let tag = format!("tag{}", i);
            let tag_set = TagSet::with_filter(&[tag.as_str()], &Filter::default());
            let result =
                tokio::time::timeout(Duration::from_millis(5), resolver.resolve(&tag_set)).await;
            assert!(result.is_err());
        }

        // Waiters on one key, all cancelled
        let tag_set = TagSet::with_filter(&["shared"], &Filter::default());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let resolver = resolver.clone();
            let tag_set = tag_set.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::timeout(Duration::from_millis(5), resolver.resolve(&tag_set)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }

        assert!(resolver.in_flight.lock().unwrap().is_empty());
    }
}
