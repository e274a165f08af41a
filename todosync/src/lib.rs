//! # todosync
//!
//! A local task store that merges a paginated, read-only remote task feed
//! into SQLite without duplicating or losing records across repeated syncs.
//!
//! Every task has a stable local id. Tasks that came from the feed also carry
//! the feed's positive integer id, and that remote id is what a sync pass
//! matches on: an unknown id is inserted, a known id whose fields moved is
//! updated, anything else is left alone. Sync never deletes.
//!
//! ## Quick start
//!
//! ```ignore
//! use todosync::TodoSyncBuilder;
//!
//! let app = TodoSyncBuilder::new("sqlite://tasks.db?mode=rwc")
//!     .with_page_size(100)
//!     .build()
//!     .await?;
//!
//! // Local edits
//! let task = app.store().add("Buy milk", None).await?;
//! app.store().toggle(task.local_id).await?;
//!
//! // Pull the remote feed in
//! let report = app.sync_now().await?;
//! println!("{} added, {} updated", report.summary.added, report.summary.updated);
//! ```
//!
//! ## Key types
//!
//! - [`TaskStore`]: CRUD, duplicate checks, search and [`TaskStore::reconcile`]
//! - [`reconcile::classify`]: the per-record insert / update / unchanged decision
//! - [`TaskPersistence`]: storage seam, with [`SqlitePersistence`] and [`MemoryPersistence`]
//! - [`RemoteFeed`]: paged feed seam, with [`HttpFeed`]
//! - [`SyncEngine`]: background fetch-and-reconcile loop
//! - [`TodoSyncBuilder`]: wires all of the above for an application

pub mod connection;
pub mod error;
pub mod feed;
pub mod messages;
pub mod persistence;
pub mod reconcile;
pub mod record;
pub mod sqlite;
pub mod store;
pub mod sync;

pub use connection::{TodoSync, TodoSyncBuilder};
pub use error::{FeedError, StoreError, SyncError, ValidationError};
pub use feed::{FeedItem, FeedPage, HttpFeed, RemoteFeed, fetch_all};
pub use messages::{ChangeKind, ChangeNotification};
pub use persistence::{MemoryPersistence, TaskPersistence, WriteBatch};
pub use record::{DEFAULT_OWNER_ID, RemoteRecord, TaskRecord};
pub use sqlite::SqlitePersistence;
pub use store::{SyncSummary, TaskStore, WriteOutcome};
pub use sync::{SyncConfig, SyncEngine, SyncHandle, SyncReport, sync_once};

// Re-export sea-orm for callers that share the connection
pub use sea_orm;
