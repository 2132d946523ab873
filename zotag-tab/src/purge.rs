//! Explicit invalidation of the query and image caches

use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use zotag_common::Result;

use crate::cache::QueryCache;
use crate::chart::ImageStore;

/// What a purge removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub queries: u64,
    pub images: u64,
}

pub struct CachePurger {
    cache: Arc<dyn QueryCache>,
    images: ImageStore,
}

impl CachePurger {
    pub fn new(cache: Arc<dyn QueryCache>, images: ImageStore) -> Self {
        Self { cache, images }
    }

    /// Drop every cached tag-set result
    pub async fn purge_queries(&self) -> Result<PurgeSummary> {
        let queries = self.cache.clear().await?;
        info!(removed = queries, "Query cache purged");
        Ok(PurgeSummary {
            queries,
            images: 0,
        })
    }

    /// Delete every rendered chart
    pub async fn purge_images(&self) -> Result<PurgeSummary> {
        let images = self.images.purge().await?;
        Ok(PurgeSummary { queries: 0, images })
    }

    pub async fn purge_all(&self) -> Result<PurgeSummary> {
        let queries = self.purge_queries().await?.queries;
        let images = self.purge_images().await?.images;
        Ok(PurgeSummary { queries, images })
    }
}
