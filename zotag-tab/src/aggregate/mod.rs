//! Count and union aggregation
//!
//! Every table cell is the size of one resolved tag set:
//! - count: `{x} ∪ filter` for each X tag
//! - union: `{x, y} ∪ filter` for each (Y, X) pair, Y outer
//!
//! Resolutions run through a bounded, order-preserving pipeline. The first
//! failure aborts the request; entries cached before it stay valid.

mod resolver;

pub use resolver::TagSetResolver;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

use crate::cache::QueryCache;
use crate::client::RemoteQueryClient;
use crate::error::QueryError;
use crate::params::{QueryParams, ValuesType};
use crate::percent;
use crate::tags::{display_label, Filter, TagSet};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// One row of a single-axis count table
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CountRow {
    #[serde(rename = "tag")]
    pub label: String,
    pub count: u64,
}

/// One row of a cross-tabulation, cells aligned with the X axis
///
/// Serializes as a JSON object keyed by X label in axis order. Repeated X
/// labels (a duplicated tag, or tags such as `!a` and `a` that share a
/// display label) are written as repeated keys; consumers that need every
/// cell should read `cells` or the table output instead.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionRow<T> {
    pub label: String,
    pub cells: Vec<(String, T)>,
}

impl<T> UnionRow<T> {
    /// First cell with the given X label
    pub fn get(&self, label: &str) -> Option<&T> {
        self.cells.iter().find(|(l, _)| l == label).map(|(_, v)| v)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.cells.iter().map(|(_, v)| v)
    }
}

impl<T: Serialize> Serialize for UnionRow<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len() + 1))?;
        map.serialize_entry("tag", &self.label)?;
        for (label, value) in &self.cells {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// Aggregation result in one of its three shapes
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum DataTable {
    Counts(Vec<CountRow>),
    Union(Vec<UnionRow<u64>>),
    Percent(Vec<UnionRow<f64>>),
}

impl DataTable {
    pub fn is_count(&self) -> bool {
        matches!(self, DataTable::Counts(_))
    }
}

pub struct Aggregator {
    resolver: TagSetResolver,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(
        cache: Arc<dyn QueryCache>,
        client: Arc<dyn RemoteQueryClient>,
        concurrency: usize,
    ) -> Self {
        Self {
            resolver: TagSetResolver::new(cache, client),
            concurrency: concurrency.max(1),
        }
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        self.resolver.cache()
    }

    /// Single-axis count table, one row per X tag in input order
    pub async fn count(
        &self,
        tags_x: &[String],
        filter: &Filter,
    ) -> Result<Vec<CountRow>, QueryError> {
        if tags_x.is_empty() {
            return Err(QueryError::NoData);
        }

        let tag_sets = tags_x
            .iter()
            .map(|x| TagSet::with_filter(&[x.as_str()], filter))
            .collect();
        let counts = self.resolve_counts(tag_sets).await?;

        Ok(tags_x
            .iter()
            .zip(counts)
            .map(|(x, count)| CountRow {
                label: display_label(x),
                count,
            })
            .collect())
    }

    /// Cross-tabulation: one row per Y tag, one cell per X tag
    pub async fn union(
        &self,
        tags_x: &[String],
        tags_y: &[String],
        filter: &Filter,
    ) -> Result<Vec<UnionRow<u64>>, QueryError> {
        if tags_x.is_empty() {
            return Err(QueryError::NoData);
        }

        let tag_sets = tags_y
            .iter()
            .flat_map(|y| {
                tags_x
                    .iter()
                    .map(move |x| TagSet::with_filter(&[x.as_str(), y.as_str()], filter))
            })
            .collect();
        let counts = self.resolve_counts(tag_sets).await?;

        Ok(tags_y
            .iter()
            .zip(counts.chunks(tags_x.len()))
            .map(|(y, row)| UnionRow {
                label: display_label(y),
                cells: tags_x
                    .iter()
                    .zip(row)
                    .map(|(x, count)| (display_label(x), *count))
                    .collect(),
            })
            .collect())
    }

    /// Evaluate a request in the shape its parameters select
    ///
    /// Empty Y axis gives a count table (percent modes do not apply);
    /// otherwise a union table, normalized per `values_type`.
    pub async fn tabulate(&self, params: &QueryParams) -> Result<DataTable, QueryError> {
        if params.tags_x.is_empty() {
            return Err(QueryError::NoData);
        }

        let filter = Filter::parse(&params.filter);

        if params.tags_y.is_empty() {
            return Ok(DataTable::Counts(self.count(&params.tags_x, &filter).await?));
        }

        let raw = self.union(&params.tags_x, &params.tags_y, &filter).await?;

        match params.values_type {
            ValuesType::Raw => Ok(DataTable::Union(raw)),
            ValuesType::PercentOfColumn => {
                let totals: Vec<u64> = self
                    .count(&params.tags_x, &filter)
                    .await?
                    .into_iter()
                    .map(|row| row.count)
                    .collect();
                Ok(DataTable::Percent(percent::percent_of_column(&raw, &totals)))
            }
            ValuesType::PercentOfRow => Ok(DataTable::Percent(percent::percent_of_row(&raw)?)),
        }
    }

    async fn resolve_counts(&self, tag_sets: Vec<TagSet>) -> Result<Vec<u64>, QueryError> {
        let resolver = &self.resolver;
        stream::iter(tag_sets.into_iter().map(|tag_set| async move {
            resolver
                .resolve(&tag_set)
                .await
                .map(|items| items.len() as u64)
        }))
        .buffered(self.concurrency)
        .try_collect()
        .await
    }
}
