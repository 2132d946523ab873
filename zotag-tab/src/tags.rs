//! Tags, filters, tag sets and their canonical cache keys
//!
//! Display labels and query values are kept strictly apart: `display_label`
//! only ever feeds row/column labels, while `TagSet::wire_values` is what
//! reaches the remote library.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Annotation markers stripped from both ends of a display label
pub const LABEL_MARKERS: &[char] = &['!', '@', '#', '$', '%', '^', '&', '*', '_', '+'];

/// Prefix marking a filter entry as "must be excluded"
pub const EXCLUDE_PREFIX: char = '-';

/// Derive the display label of a raw tag
///
/// Strips `LABEL_MARKERS` from both ends. A tag made only of markers
/// (e.g. `"!!!"`) keeps its original text so labels are never empty.
pub fn display_label(tag: &str) -> String {
    let stripped = tag.trim_matches(LABEL_MARKERS);
    if stripped.is_empty() {
        tag.to_string()
    } else {
        stripped.to_string()
    }
}

/// One constraint of an intersection query
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryTerm {
    pub tag: String,
    pub excluded: bool,
}

impl QueryTerm {
    pub fn include(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            excluded: false,
        }
    }

    pub fn exclude(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            excluded: true,
        }
    }

    /// Parse a filter entry; `-name` excludes `name`
    ///
    /// A bare `-` is kept as an ordinary tag.
    pub fn parse_filter_entry(entry: &str) -> Self {
        match entry.strip_prefix(EXCLUDE_PREFIX) {
            Some(rest) if !rest.is_empty() => Self::exclude(rest),
            _ => Self::include(entry),
        }
    }

    /// Value sent to the remote library as a `tag` parameter
    pub fn wire_value(&self) -> String {
        if self.excluded {
            format!("{}{}", EXCLUDE_PREFIX, self.tag)
        } else {
            self.tag.clone()
        }
    }
}

/// Filter applied to every query of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    terms: Vec<QueryTerm>,
}

impl Filter {
    /// Build a filter from raw entries, skipping blank ones
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Self {
        let terms = entries
            .iter()
            .map(|e| e.as_ref().trim())
            .filter(|e| !e.is_empty())
            .map(QueryTerm::parse_filter_entry)
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }
}

/// Order-independent, duplicate-free set of query terms
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    terms: BTreeSet<QueryTerm>,
}

impl TagSet {
    /// `{tags...} ∪ filter`
    pub fn with_filter(tags: &[&str], filter: &Filter) -> Self {
        let mut set: TagSet = tags.iter().map(|t| QueryTerm::include(*t)).collect();
        for term in filter.terms() {
            set.insert(term.clone());
        }
        set
    }

    pub fn insert(&mut self, term: QueryTerm) -> bool {
        self.terms.insert(term)
    }

    pub fn contains(&self, term: &QueryTerm) -> bool {
        self.terms.contains(term)
    }

    /// Sorted, de-duplicated values as sent to the remote library
    pub fn wire_values(&self) -> Vec<String> {
        let values: BTreeSet<String> = self.terms.iter().map(QueryTerm::wire_value).collect();
        values.into_iter().collect()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::canonical(self)
    }
}

impl FromIterator<QueryTerm> for TagSet {
    fn from_iter<I: IntoIterator<Item = QueryTerm>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().collect(),
        }
    }
}

/// Canonical serialization of a `TagSet`
///
/// The key is the JSON array of the set's sorted wire values, so two sets
/// that send the same constraints share one key regardless of input order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn canonical(tag_set: &TagSet) -> Self {
        let values = serde_json::Value::from(tag_set.wire_values());
        Self(values.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 hex digest of the canonical key (storage address)
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
