use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::{StoreError, SyncError};
use crate::feed::{DEFAULT_FEED_URL, HttpFeed, RemoteFeed};
use crate::messages::ChangeNotification;
use crate::sqlite::SqlitePersistence;
use crate::store::TaskStore;
use crate::sync::{SyncConfig, SyncEngine, SyncHandle, SyncReport};

/// A SQLite-backed task store wired to a remote feed and a running sync
/// engine.
///
/// Build one per process with [`TodoSyncBuilder`] and share it; it owns the
/// only write path to the database.
pub struct TodoSync {
    store: Arc<TaskStore<SqlitePersistence>>,
    feed: Arc<HttpFeed>,
    sync: SyncHandle,
}

impl TodoSync {
    /// The store used for all local reads and writes.
    pub fn store(&self) -> &Arc<TaskStore<SqlitePersistence>> {
        &self.store
    }

    pub fn feed(&self) -> &Arc<HttpFeed> {
        &self.feed
    }

    /// Get a handle for requesting sync passes from other tasks.
    pub fn sync_handle(&self) -> SyncHandle {
        self.sync.clone()
    }

    /// Get a handle to the change notification broadcast channel.
    pub fn change_rx(&self) -> broadcast::Receiver<ChangeNotification> {
        self.store.subscribe()
    }

    /// Run a sync pass now and wait for it.
    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        self.sync.sync().await
    }

    /// Ask the feed how many tasks it holds.
    pub async fn remote_total(&self) -> Result<usize, SyncError> {
        Ok(self.feed.fetch_total_count().await?)
    }
}

/// Builder for [`TodoSync`].
pub struct TodoSyncBuilder {
    database_url: String,
    feed_url: String,
    request_timeout: Duration,
    config: SyncConfig,
}

impl TodoSyncBuilder {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            config: SyncConfig::default(),
        }
    }

    pub fn with_feed_url(mut self, url: &str) -> Self {
        self.feed_url = url.to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    /// Sync periodically in the background as well as on request.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.config.interval = Some(interval);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Open the database, build the feed client and start the sync engine
    /// in a background task.
    pub async fn build(self) -> Result<TodoSync, SyncError> {
        let persistence = SqlitePersistence::connect(&self.database_url)
            .await
            .map_err(StoreError::from)?;
        let store = Arc::new(TaskStore::new(Arc::new(persistence)));
        let feed = Arc::new(HttpFeed::new(&self.feed_url, self.request_timeout)?);

        log::info!(
            "Opened task store at {} syncing from {}",
            self.database_url,
            feed.base_url()
        );

        let (engine, sync) = SyncEngine::new(store.clone(), feed.clone(), self.config);
        engine.start();

        Ok(TodoSync { store, feed, sync })
    }
}
