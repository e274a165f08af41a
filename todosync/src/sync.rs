//! Background sync: fetch the whole remote feed, then reconcile it into the
//! store.
//!
//! A fetch failure skips the pass and leaves local tasks exactly as they
//! were. Requests are handled one at a time by a single engine task, so two
//! passes never overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::error::SyncError;
use crate::feed::{RemoteFeed, fetch_all};
use crate::persistence::TaskPersistence;
use crate::store::{SyncSummary, TaskStore};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records requested per feed page.
    pub page_size: usize,
    /// Pages fetched before a pass is abandoned.
    pub max_pages: usize,
    /// Run a pass on this period. `None` syncs only on request.
    pub interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 1000,
            interval: None,
        }
    }
}

/// Outcome of one successful sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub summary: SyncSummary,
    /// Records received from the feed.
    pub fetched: usize,
    /// What the feed reports as its total, if that request succeeded.
    pub remote_total: Option<usize>,
}

/// Run one fetch-and-reconcile pass.
pub async fn sync_once<P, F>(store: &TaskStore<P>, feed: &F, config: &SyncConfig) -> Result<SyncReport, SyncError>
where
    P: TaskPersistence,
    F: RemoteFeed + ?Sized,
{
    let records = match fetch_all(feed, config.page_size, config.max_pages).await {
        Ok(records) => records,
        Err(e) => {
            log::warn!("Remote fetch failed, keeping local tasks: {}", e);
            return Err(e.into());
        }
    };

    let summary = store.reconcile(&records).await?;

    let remote_total = match feed.fetch_total_count().await {
        Ok(total) => Some(total),
        Err(e) => {
            log::warn!("Could not read remote task total: {}", e);
            None
        }
    };

    Ok(SyncReport {
        summary,
        fetched: records.len(),
        remote_total,
    })
}

struct SyncRequest {
    reply: oneshot::Sender<Result<SyncReport, SyncError>>,
}

/// Cloneable handle used to ask a running [`SyncEngine`] for a pass.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncRequest>,
}

impl SyncHandle {
    /// Request a pass and wait for its result. Queues behind any pass
    /// already in flight.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SyncRequest { reply })
            .await
            .map_err(|_| SyncError::EngineStopped)?;
        rx.await.map_err(|_| SyncError::EngineStopped)?
    }
}

pub struct SyncEngine<P: TaskPersistence, F: RemoteFeed + ?Sized> {
    store: Arc<TaskStore<P>>,
    feed: Arc<F>,
    config: SyncConfig,
    rx: mpsc::Receiver<SyncRequest>,
}

impl<P, F> SyncEngine<P, F>
where
    P: TaskPersistence + 'static,
    F: RemoteFeed + ?Sized + 'static,
{
    pub fn new(store: Arc<TaskStore<P>>, feed: Arc<F>, config: SyncConfig) -> (Self, SyncHandle) {
        // Callers beyond the first queued request wait on `send`.
        let (tx, rx) = mpsc::channel(1);
        let engine = Self {
            store,
            feed,
            config,
            rx,
        };
        (engine, SyncHandle { tx })
    }

    /// Spawn the engine loop. It ends once every [`SyncHandle`] is dropped.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut ticker = self.config.interval.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => {
                        let result = self.pass().await;
                        let _ = request.reply.send(result);
                    }
                    None => break,
                },
                _ = next_tick(&mut ticker) => {
                    let _ = self.pass().await;
                }
            }
        }
        log::debug!("Sync engine stopped");
    }

    async fn pass(&self) -> Result<SyncReport, SyncError> {
        let result = sync_once(&self.store, self.feed.as_ref(), &self.config).await;
        match &result {
            Ok(report) => log::info!(
                "Sync finished: fetched {}, {} added, {} updated",
                report.fetched,
                report.summary.added,
                report.summary.updated
            ),
            Err(e) => log::error!("Background sync failed: {}", e),
        }
        result
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::error::FeedError;
    use crate::feed::{FeedItem, FeedPage};
    use crate::persistence::MemoryPersistence;

    /// Serves a fixed item list; can be switched into failure.
    #[derive(Default)]
    struct ScriptedFeed {
        items: Vec<FeedItem>,
        down: AtomicBool,
        requests: AtomicUsize,
    }

    impl ScriptedFeed {
        fn with_items(n: i64) -> Self {
            Self {
                items: (1..=n)
                    .map(|id| FeedItem {
                        id,
                        text: format!("Feed {id}"),
                        completed: false,
                        owner_id: 1,
                    })
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl RemoteFeed for ScriptedFeed {
        async fn fetch_page(&self, limit: usize, offset: usize) -> Result<FeedPage, FeedError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(FeedError::Status(503));
            }
            let records = self.items.iter().skip(offset).take(limit).cloned().collect();
            Ok(FeedPage {
                records,
                total: self.items.len(),
                skip: offset,
                limit,
            })
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            page_size: 4,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sync_once_reconciles_all_pages() {
        let store = TaskStore::new(Arc::new(MemoryPersistence::new()));
        let feed = ScriptedFeed::with_items(10);

        let report = sync_once(&store, &feed, &config()).await.unwrap();
        assert_eq!(report.fetched, 10);
        assert_eq!(report.summary.added, 10);
        assert_eq!(report.remote_total, Some(10));
        assert_eq!(store.all().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_local_state() {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = TaskStore::new(persistence.clone());
        store.add("Local only", None).await.unwrap();
        let commits = persistence.commit_count();

        let feed = ScriptedFeed::with_items(3);
        feed.down.store(true, Ordering::SeqCst);
        let err = sync_once(&store, &feed, &config()).await.unwrap_err();

        assert!(matches!(err, SyncError::Feed(FeedError::Status(503))));
        assert_eq!(feed.requests.load(Ordering::SeqCst), 1);
        assert_eq!(persistence.commit_count(), commits);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unusable_feed_items_do_not_pile_up() {
        let store = TaskStore::new(Arc::new(MemoryPersistence::new()));
        let mut feed = ScriptedFeed::with_items(3);
        feed.items[0].id = 0;
        feed.items[2].text = "  ".into();

        let first = sync_once(&store, &feed, &config()).await.unwrap();
        assert_eq!(first.fetched, 1);
        assert_eq!(first.summary.added, 1);
        let rows = store.all().await.unwrap().len();

        let second = sync_once(&store, &feed, &config()).await.unwrap();
        assert_eq!(second.summary.unchanged, second.fetched);
        assert_eq!(second.summary.added, 0);
        assert_eq!(store.all().await.unwrap().len(), rows);
        assert!(
            store
                .all()
                .await
                .unwrap()
                .iter()
                .all(|r| r.remote_id.is_some() && !r.title.is_empty())
        );
    }

    #[tokio::test]
    async fn test_engine_serves_requests_and_survives_failures() {
        let store = Arc::new(TaskStore::new(Arc::new(MemoryPersistence::new())));
        let feed = Arc::new(ScriptedFeed::with_items(5));
        let (engine, handle) = SyncEngine::new(store.clone(), feed.clone(), config());
        let task = engine.start();

        feed.down.store(true, Ordering::SeqCst);
        assert!(handle.sync().await.is_err());

        feed.down.store(false, Ordering::SeqCst);
        let report = handle.sync().await.unwrap();
        assert_eq!(report.summary.added, 5);

        let report = handle.sync().await.unwrap();
        assert_eq!(report.summary.unchanged, 5);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_runs_on_interval() {
        let store = Arc::new(TaskStore::new(Arc::new(MemoryPersistence::new())));
        let feed = Arc::new(ScriptedFeed::with_items(2));
        let mut rx = store.subscribe();
        let (engine, _handle) = SyncEngine::new(
            store.clone(),
            feed,
            SyncConfig {
                interval: Some(Duration::from_secs(60)),
                ..config()
            },
        );
        engine.start();

        // The first tick fires immediately.
        rx.recv().await.unwrap();
        assert_eq!(store.all().await.unwrap().len(), 2);
    }
}
