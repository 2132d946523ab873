//! Zotero Web API client
//!
//! One `fetch` resolves one tag-set intersection: every term becomes a `tag`
//! query parameter (AND semantics), excluded terms are sent as `-name`, and
//! `Link: <...>; rel="next"` headers are followed until the result set is
//! complete. Failures are never retried.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::tags::TagSet;

pub const ZOTERO_BASE_URL: &str = "https://api.zotero.org";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("zotag-tab/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "3";

/// Item key → item version, as returned by `format=versions`
pub type ItemVersions = BTreeMap<String, u64>;

/// Remote library failures
#[derive(Debug, Error)]
pub enum RemoteServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Performs exact tag-set intersection queries against the remote library
#[async_trait]
pub trait RemoteQueryClient: Send + Sync {
    /// Return every item carrying all terms of `tag_set`
    async fn fetch(&self, tag_set: &TagSet) -> Result<ItemVersions, RemoteServiceError>;
}

/// Zotero library kind, selecting the `/groups/` or `/users/` URL prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibraryType {
    #[default]
    Group,
    User,
}

impl LibraryType {
    fn path_segment(self) -> &'static str {
        match self {
            LibraryType::Group => "groups",
            LibraryType::User => "users",
        }
    }
}

impl FromStr for LibraryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "group" | "groups" => Ok(LibraryType::Group),
            "user" | "users" => Ok(LibraryType::User),
            other => Err(format!("unknown library type '{}'", other)),
        }
    }
}

/// Connection settings for one Zotero library
#[derive(Debug, Clone, PartialEq)]
pub struct ZoteroSettings {
    pub base_url: String,
    pub library_type: LibraryType,
    pub library_id: String,
    pub api_key: Option<String>,
    pub page_size: u32,
    pub timeout: Duration,
}

impl ZoteroSettings {
    pub fn new(library_type: LibraryType, library_id: impl Into<String>) -> Self {
        Self {
            base_url: ZOTERO_BASE_URL.to_string(),
            library_type,
            library_id: library_id.into(),
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// `{base}/{groups|users}/{id}/items`
    pub fn items_url(&self) -> String {
        format!(
            "{}/{}/{}/items",
            self.base_url.trim_end_matches('/'),
            self.library_type.path_segment(),
            self.library_id
        )
    }
}

/// Delays requests while the server has asked clients to back off
struct BackoffGate {
    not_before: Mutex<Option<Instant>>,
}

impl BackoffGate {
    fn new() -> Self {
        Self {
            not_before: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let not_before = *self.not_before.lock().await;
        if let Some(deadline) = not_before {
            let now = Instant::now();
            if deadline > now {
                let wait_time = deadline - now;
                tracing::debug!("Zotero backoff: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
    }

    async fn defer(&self, seconds: u64) {
        let mut not_before = self.not_before.lock().await;
        let deadline = Instant::now() + Duration::from_secs(seconds);
        if not_before.map_or(true, |current| current < deadline) {
            *not_before = Some(deadline);
        }
    }
}

/// Zotero Web API v3 client
pub struct ZoteroClient {
    http_client: reqwest::Client,
    settings: ZoteroSettings,
    backoff: Arc<BackoffGate>,
}

impl ZoteroClient {
    pub fn new(settings: ZoteroSettings) -> Result<Self, RemoteServiceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| RemoteServiceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            settings,
            backoff: Arc::new(BackoffGate::new()),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> RemoteServiceError {
        if e.is_timeout() {
            RemoteServiceError::Timeout(self.settings.timeout)
        } else {
            RemoteServiceError::Network(e.to_string())
        }
    }

    /// Fetch one page; returns its items and the next-page URL, if any
    async fn fetch_page(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(ItemVersions, Option<String>), RemoteServiceError> {
        self.backoff.wait().await;

        let mut request = request.header("Zotero-API-Version", API_VERSION);
        if let Some(key) = &self.settings.api_key {
            request = request.header("Zotero-API-Key", key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        if let Some(seconds) = header_seconds(&response, "Backoff") {
            self.backoff.defer(seconds).await;
        }

        let status = response.status();
        if !status.is_success() {
            if let Some(seconds) = header_seconds(&response, "Retry-After") {
                self.backoff.defer(seconds).await;
            }
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteServiceError::Api(status.as_u16(), error_text));
        }

        let next = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_next_link);

        let items: ItemVersions = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RemoteServiceError::Timeout(self.settings.timeout)
            } else {
                RemoteServiceError::Parse(e.to_string())
            }
        })?;

        Ok((items, next))
    }
}

#[async_trait]
impl RemoteQueryClient for ZoteroClient {
    async fn fetch(&self, tag_set: &TagSet) -> Result<ItemVersions, RemoteServiceError> {
        let mut params: Vec<(&str, String)> = tag_set
            .wire_values()
            .into_iter()
            .map(|tag| ("tag", tag))
            .collect();
        params.push(("format", "versions".to_string()));
        params.push(("limit", self.settings.page_size.to_string()));

        tracing::debug!(tags = %tag_set.cache_key(), "Querying Zotero API");

        let mut request = self.http_client.get(self.settings.items_url()).query(&params);
        let mut items = ItemVersions::new();
        let mut pages = 0usize;

        loop {
            let (page, next) = self.fetch_page(request).await?;
            pages += 1;
            items.extend(page);

            match next {
                Some(url) => request = self.http_client.get(url),
                None => break,
            }
        }

        tracing::debug!(
            tags = %tag_set.cache_key(),
            items = items.len(),
            pages = pages,
            "Zotero query complete"
        );

        Ok(items)
    }
}

fn header_seconds(response: &reqwest::Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
