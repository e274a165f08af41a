//! Error types for the task store, the remote feed, and the sync engine.
//!
//! The store is the only error boundary for local data. Callers branch on
//! [`StoreError`] to tell a rejected input apart from a missing record or a
//! failed commit.

use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Input rejected before any store mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Task title cannot be empty")]
    EmptyTitle,

    #[error("This task already exists")]
    DuplicateTask,

    #[error("A task with remote id {0} already exists")]
    DuplicateRemoteId(i64),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Task with ID {0} not found")]
    NotFound(Uuid),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DbErr),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Request to remote feed failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote feed answered with status {0}")]
    Status(u16),

    #[error("Failed to decode remote feed page: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Remote feed did not finish within {0} pages")]
    PageLimitExceeded(usize),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Fetching remote tasks failed: {0}")]
    Feed(#[from] FeedError),

    #[error("Applying remote tasks failed: {0}")]
    Store(#[from] StoreError),

    #[error("Sync engine is not running")]
    EngineStopped,
}
