//! Persistence providers for the task store.
//!
//! A provider loads the full record set and applies a [`WriteBatch`] as one
//! all-or-nothing unit. Staging writes into a batch and committing it once
//! is the only way to change stored records; the store never writes a row on
//! its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use sea_orm::DbErr;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::record::{TaskRecord, sort_newest_first};

/// Writes staged for a single commit.
///
/// Saving the same local id twice keeps only the last version. Deleting a
/// record drops any save staged for it.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    saves: Vec<TaskRecord>,
    positions: HashMap<Uuid, usize>,
    deletes: Vec<Uuid>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert-or-replace of `record`, keyed by its local id.
    pub fn save(&mut self, record: TaskRecord) {
        self.deletes.retain(|id| *id != record.local_id);
        match self.positions.get(&record.local_id) {
            Some(&pos) => self.saves[pos] = record,
            None => {
                self.positions.insert(record.local_id, self.saves.len());
                self.saves.push(record);
            }
        }
    }

    /// Stage removal of the record with `local_id`.
    pub fn delete(&mut self, local_id: Uuid) {
        if let Some(pos) = self.positions.remove(&local_id) {
            self.saves.remove(pos);
            for p in self.positions.values_mut() {
                if *p > pos {
                    *p -= 1;
                }
            }
        }
        if !self.deletes.contains(&local_id) {
            self.deletes.push(local_id);
        }
    }

    pub fn saves(&self) -> &[TaskRecord] {
        &self.saves
    }

    pub fn deletes(&self) -> &[Uuid] {
        &self.deletes
    }

    pub fn len(&self) -> usize {
        self.saves.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletes.is_empty()
    }

    pub fn into_parts(self) -> (Vec<TaskRecord>, Vec<Uuid>) {
        (self.saves, self.deletes)
    }
}

/// Durable storage for task records.
#[async_trait::async_trait]
pub trait TaskPersistence: Send + Sync {
    /// Every stored record, newest `created_at` first.
    async fn load_all(&self) -> Result<Vec<TaskRecord>, DbErr>;

    /// The record with `local_id`, if stored.
    async fn load(&self, local_id: Uuid) -> Result<Option<TaskRecord>, DbErr> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|r| r.local_id == local_id))
    }

    /// Apply every staged write, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), DbErr>;
}

/// In-process provider. Records live only as long as the value.
///
/// Counts commits so callers can check that no redundant writes happen.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    rows: Mutex<Vec<TaskRecord>>,
    commits: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `records` already stored, in the given order. Does not
    /// count as a commit.
    pub fn with_records(records: Vec<TaskRecord>) -> Self {
        Self {
            rows: Mutex::new(records),
            commits: AtomicUsize::new(0),
        }
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TaskPersistence for MemoryPersistence {
    async fn load_all(&self) -> Result<Vec<TaskRecord>, DbErr> {
        let mut rows = self.rows.lock().await.clone();
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), DbErr> {
        let mut rows = self.rows.lock().await;
        let (saves, deletes) = batch.into_parts();
        for record in saves {
            match rows.iter_mut().find(|r| r.local_id == record.local_id) {
                Some(existing) => *existing = record,
                None => rows.push(record),
            }
        }
        rows.retain(|r| !deletes.contains(&r.local_id));
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
