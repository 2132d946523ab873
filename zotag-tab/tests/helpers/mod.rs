//! Test Helper Utilities
//!
//! Shared fixtures for zotag-tab integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zotag_tab::aggregate::Aggregator;
use zotag_tab::cache::{MemoryQueryCache, QueryCache};
use zotag_tab::client::{ItemVersions, RemoteQueryClient, RemoteServiceError};
use zotag_tab::tags::TagSet;

/// Sorted wire values identifying one tag set
pub fn key(tags: &[&str]) -> Vec<String> {
    let mut values: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
    values.sort();
    values.dedup();
    values
}

/// Remote client returning canned item counts and recording every fetch
#[derive(Default)]
pub struct CountingClient {
    counts: HashMap<Vec<String>, usize>,
    failing: Option<Vec<String>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl CountingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the tag set `tags` with `count` items; unknown sets have none
    pub fn with_count(mut self, tags: &[&str], count: usize) -> Self {
        self.counts.insert(key(tags), count);
        self
    }

    /// Fail every fetch of the tag set `tags`
    pub fn failing_on(mut self, tags: &[&str]) -> Self {
        self.failing = Some(key(tags));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, tags: &[&str]) -> usize {
        let wanted = key(tags);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|k| **k == wanted)
            .count()
    }
}

#[async_trait]
impl RemoteQueryClient for CountingClient {
    async fn fetch(&self, tag_set: &TagSet) -> Result<ItemVersions, RemoteServiceError> {
        let wire = tag_set.wire_values();
        self.calls.lock().unwrap().push(wire.clone());

        if self.failing.as_ref() == Some(&wire) {
            return Err(RemoteServiceError::Api(500, "Internal Server Error".to_string()));
        }

        let count = self.counts.get(&wire).copied().unwrap_or(0);
        Ok((0..count)
            .map(|i| (format!("{}-{}", wire.join("+"), i), 1))
            .collect())
    }
}

/// Aggregator over a fresh memory cache
pub fn memory_aggregator(client: Arc<CountingClient>) -> (Aggregator, Arc<MemoryQueryCache>) {
    let cache = Arc::new(MemoryQueryCache::new());
    let cache_dyn: Arc<dyn QueryCache> = cache.clone();
    (Aggregator::new(cache_dyn, client, 4), cache)
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
