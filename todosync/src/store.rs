//! The task store: local CRUD, duplicate detection, search, and the
//! reconciliation entry point for remote feeds.
//!
//! Every write runs under one lock for its whole read, decide and commit
//! sequence, so a sync pass and a local edit never interleave. Reads go
//! straight to the provider and see the last committed state.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::error::{StoreError, ValidationError};
use crate::messages::{ChangeKind, ChangeNotification};
use crate::persistence::{TaskPersistence, WriteBatch};
use crate::reconcile::{Decision, SnapshotIndex, classify};
use crate::record::{RemoteRecord, TaskRecord, fold, normalize_description};

/// Tallies from one reconcile pass. Always sums to the number of remote
/// records passed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl SyncSummary {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.unchanged
    }
}

/// Result of an edit that may turn out to be a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record changed and was committed.
    Written(TaskRecord),
    /// Nothing tracked differed; nothing was written.
    Unchanged(TaskRecord),
}

impl WriteOutcome {
    pub fn record(&self) -> &TaskRecord {
        match self {
            WriteOutcome::Written(r) | WriteOutcome::Unchanged(r) => r,
        }
    }

    pub fn into_record(self) -> TaskRecord {
        match self {
            WriteOutcome::Written(r) | WriteOutcome::Unchanged(r) => r,
        }
    }

    pub fn was_written(&self) -> bool {
        matches!(self, WriteOutcome::Written(_))
    }
}

pub struct TaskStore<P: TaskPersistence> {
    persistence: Arc<P>,
    write_lock: Mutex<()>,
    change_tx: broadcast::Sender<ChangeNotification>,
}

impl<P: TaskPersistence> TaskStore<P> {
    pub fn new(persistence: Arc<P>) -> Self {
        let (change_tx, _) = broadcast::channel(256);
        Self {
            persistence,
            write_lock: Mutex::new(()),
            change_tx,
        }
    }

    pub fn persistence(&self) -> &Arc<P> {
        &self.persistence
    }

    /// Receive a [`ChangeNotification`] after every committed write.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.change_tx.subscribe()
    }

    // ---------------------------------------------------------------
    // Reconciliation
    // ---------------------------------------------------------------

    /// Merge a full remote record set into the store.
    ///
    /// Records are matched by remote id and applied in feed order against
    /// one snapshot. All resulting writes are committed together; if the
    /// commit fails nothing is stored and the error is returned. Nothing is
    /// ever deleted.
    pub async fn reconcile(&self, remote: &[RemoteRecord]) -> Result<SyncSummary, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut working = self.persistence.load_all().await?;
        let mut index = SnapshotIndex::build(&working);
        if index.shadowed() > 0 {
            log::warn!(
                "{} stored tasks share a remote id with a newer task and will not be synced",
                index.shadowed()
            );
        }
        let now = Utc::now();
        let mut batch = WriteBatch::new();
        let mut summary = SyncSummary::default();

        for record in remote {
            match classify(record, &index, &working, now) {
                Decision::Insert(new) => {
                    index.record_insert(working.len(), &new);
                    batch.save(new.clone());
                    working.push(new);
                    summary.added += 1;
                }
                Decision::Update { slot, record } => {
                    index.record_update(slot, &working[slot], &record);
                    batch.save(record.clone());
                    working[slot] = record;
                    summary.updated += 1;
                }
                Decision::Unchanged { .. } => summary.unchanged += 1,
            }
        }

        if !batch.is_empty() {
            self.commit(batch, "reconcile pass").await?;
        }

        log::info!(
            "Reconciled {} remote tasks: {} added, {} updated, {} unchanged",
            remote.len(),
            summary.added,
            summary.updated,
            summary.unchanged
        );
        self.notify(ChangeNotification::reconciled(summary));
        Ok(summary)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// All records, newest first.
    pub async fn all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.persistence.load_all().await?)
    }

    /// Records whose title or description contains `text`, ignoring case,
    /// newest first. Empty text matches everything.
    pub async fn filter(&self, text: &str) -> Result<Vec<TaskRecord>, StoreError> {
        let records = self.persistence.load_all().await?;
        if text.is_empty() {
            return Ok(records);
        }
        let needle = text.to_lowercase();
        Ok(records
            .into_iter()
            .filter(|r| r.matches_lowercase(&needle))
            .collect())
    }

    pub async fn get(&self, local_id: Uuid) -> Result<TaskRecord, StoreError> {
        self.persistence
            .load(local_id)
            .await?
            .ok_or(StoreError::NotFound(local_id))
    }

    /// True if a stored title equals `title`, or failing that a stored
    /// description equals a non-empty `description`. Both comparisons trim
    /// and ignore case.
    pub async fn exists(&self, title: &str, description: Option<&str>) -> Result<bool, StoreError> {
        let records = self.persistence.load_all().await?;
        Ok(is_duplicate(&records, title, description))
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Store a new task built from user input.
    pub async fn add(&self, title: &str, description: Option<&str>) -> Result<TaskRecord, StoreError> {
        self.create(TaskRecord::new_local(title, description)).await
    }

    /// Store `record` unless it duplicates an existing task.
    pub async fn create(&self, record: TaskRecord) -> Result<TaskRecord, StoreError> {
        let record = record.normalized();
        if record.title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }

        let _guard = self.write_lock.lock().await;
        let records = self.persistence.load_all().await?;

        if let Some(remote_id) = record.remote_id {
            if records.iter().any(|r| r.remote_id == Some(remote_id)) {
                return Err(ValidationError::DuplicateRemoteId(remote_id).into());
            }
        }
        if records.iter().any(|r| r.local_id == record.local_id)
            || is_duplicate(&records, &record.title, record.description.as_deref())
        {
            return Err(ValidationError::DuplicateTask.into());
        }

        let mut batch = WriteBatch::new();
        batch.save(record.clone());
        self.commit(batch, "new task").await?;

        log::debug!("Created task {}", record.local_id);
        self.notify(ChangeNotification::task(ChangeKind::Created, record.local_id));
        Ok(record)
    }

    /// Replace the stored fields of `record.local_id`.
    ///
    /// Skips the write when title, description, completion, owner and
    /// remote id all match what is stored. `created_at` is never changed.
    pub async fn update(&self, record: TaskRecord) -> Result<WriteOutcome, StoreError> {
        let record = record.normalized();
        if record.title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }

        let _guard = self.write_lock.lock().await;
        let stored = self.load_existing(record.local_id).await?;
        self.apply_edit(stored, record).await
    }

    /// Flip the completion flag.
    pub async fn toggle(&self, local_id: Uuid) -> Result<TaskRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let stored = self.load_existing(local_id).await?;
        let edited = TaskRecord {
            is_completed: !stored.is_completed,
            ..stored.clone()
        };
        Ok(self.apply_edit(stored, edited).await?.into_record())
    }

    /// Replace only the description. Blank text clears it.
    pub async fn set_description(&self, local_id: Uuid, description: &str) -> Result<TaskRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let stored = self.load_existing(local_id).await?;
        let edited = TaskRecord {
            description: normalize_description(Some(description)),
            ..stored.clone()
        };
        Ok(self.apply_edit(stored, edited).await?.into_record())
    }

    pub async fn delete(&self, local_id: Uuid) -> Result<TaskRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let stored = self.load_existing(local_id).await?;

        let mut batch = WriteBatch::new();
        batch.delete(local_id);
        self.commit(batch, "task deletion").await?;

        log::debug!("Deleted task {}", local_id);
        self.notify(ChangeNotification::task(ChangeKind::Deleted, local_id));
        Ok(stored)
    }

    // ---------------------------------------------------------------
    // Internals. Callers hold `write_lock`.
    // ---------------------------------------------------------------

    async fn load_existing(&self, local_id: Uuid) -> Result<TaskRecord, StoreError> {
        self.persistence
            .load(local_id)
            .await?
            .ok_or(StoreError::NotFound(local_id))
    }

    async fn apply_edit(&self, stored: TaskRecord, edited: TaskRecord) -> Result<WriteOutcome, StoreError> {
        if !edited.differs_from(&stored) {
            return Ok(WriteOutcome::Unchanged(stored));
        }
        let edited = TaskRecord {
            created_at: stored.created_at,
            ..edited
        };

        if let Some(remote_id) = edited.remote_id {
            if edited.remote_id != stored.remote_id {
                let taken = self
                    .persistence
                    .load_all()
                    .await?
                    .iter()
                    .any(|r| r.local_id != edited.local_id && r.remote_id == Some(remote_id));
                if taken {
                    return Err(ValidationError::DuplicateRemoteId(remote_id).into());
                }
            }
        }

        let mut batch = WriteBatch::new();
        batch.save(edited.clone());
        self.commit(batch, "task update").await?;

        log::debug!("Updated task {}", edited.local_id);
        self.notify(ChangeNotification::task(ChangeKind::Updated, edited.local_id));
        Ok(WriteOutcome::Written(edited))
    }

    async fn commit(&self, batch: WriteBatch, what: &str) -> Result<(), StoreError> {
        let writes = batch.len();
        self.persistence.commit(batch).await.map_err(|e| {
            log::error!("Failed to commit {} ({} writes): {}", what, writes, e);
            StoreError::from(e)
        })
    }

    fn notify(&self, notification: ChangeNotification) {
        // No subscribers is fine.
        let _ = self.change_tx.send(notification);
    }
}

fn is_duplicate(records: &[TaskRecord], title: &str, description: Option<&str>) -> bool {
    let title = fold(title);
    if records.iter().any(|r| fold(&r.title) == title) {
        return true;
    }
    match description.map(fold).filter(|d| !d.is_empty()) {
        Some(description) => records
            .iter()
            .filter_map(|r| r.description.as_deref())
            .any(|d| fold(d) == description),
        None => false,
    }
}
