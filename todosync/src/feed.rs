//! Read-only remote task feed.
//!
//! The feed serves tasks in pages of `limit` records starting at `skip`.
//! [`fetch_all`] walks the pages until one comes back short.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::record::RemoteRecord;

/// Public feed the application syncs from by default.
pub const DEFAULT_FEED_URL: &str = "https://dummyjson.com";

/// One page of the feed as it appears on the wire.
///
/// The legacy field names `todos`, `todo` and `userId` are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    #[serde(alias = "todos")]
    pub records: Vec<FeedItem>,
    pub total: usize,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: usize,
}

impl FeedPage {
    pub fn completed_count(&self) -> usize {
        self.records.iter().filter(|r| r.completed).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: i64,
    #[serde(alias = "todo")]
    pub text: String,
    pub completed: bool,
    #[serde(rename = "ownerId", alias = "userId")]
    pub owner_id: i64,
}

impl FeedItem {
    /// A usable item has a positive id and non-blank text.
    pub fn is_valid(&self) -> bool {
        self.id > 0 && !self.text.trim().is_empty()
    }
}

impl From<FeedItem> for RemoteRecord {
    /// Each conversion synthesizes a new local id.
    fn from(item: FeedItem) -> Self {
        RemoteRecord::new(item.id, item.text, item.completed, item.owner_id)
    }
}

#[async_trait::async_trait]
pub trait RemoteFeed: Send + Sync {
    /// Fetch up to `limit` records starting at `offset`.
    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<FeedPage, FeedError>;

    /// Total number of records the feed reports, from a one-record page.
    async fn fetch_total_count(&self) -> Result<usize, FeedError> {
        Ok(self.fetch_page(1, 0).await?.total)
    }
}

/// Fetch every record, `page_size` at a time, giving up after `max_pages`.
///
/// Items with a non-positive id or blank text are skipped with a warning;
/// they have no stable identity to reconcile against.
pub async fn fetch_all<F>(feed: &F, page_size: usize, max_pages: usize) -> Result<Vec<RemoteRecord>, FeedError>
where
    F: RemoteFeed + ?Sized,
{
    let page_size = page_size.max(1);
    let mut records = Vec::new();
    let mut offset = 0;

    for _ in 0..max_pages {
        let page = feed.fetch_page(page_size, offset).await?;
        let received = page.records.len();
        log::debug!("Fetched {} remote tasks at offset {}", received, offset);
        for item in page.records {
            if item.is_valid() {
                records.push(RemoteRecord::from(item));
            } else {
                log::warn!("Skipping remote task {} with text {:?}", item.id, item.text);
            }
        }
        if received < page_size {
            return Ok(records);
        }
        offset += page_size;
    }

    Err(FeedError::PageLimitExceeded(max_pages))
}

/// [`RemoteFeed`] over HTTP: `GET {base_url}/todos?limit=L&skip=S`.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl RemoteFeed for HttpFeed {
    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<FeedPage, FeedError> {
        let url = format!("{}/todos?limit={}&skip={}", self.base_url, limit, offset);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Remote feed returned {} for {}", status, url);
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
