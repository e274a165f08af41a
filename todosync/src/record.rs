//! Task records as the store sees them.
//!
//! A [`TaskRecord`] is the canonical local entity. A [`RemoteRecord`] is what
//! one feed item becomes before reconciliation; it carries a freshly
//! synthesized local id that is never persisted or reused across fetches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner assigned to tasks created on this device.
pub const DEFAULT_OWNER_ID: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub local_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub remote_id: Option<i64>,
}

impl TaskRecord {
    /// A new, purely local task owned by [`DEFAULT_OWNER_ID`].
    pub fn new_local(title: &str, description: Option<&str>) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            title: title.trim().to_string(),
            description: normalize_description(description),
            is_completed: false,
            owner_id: DEFAULT_OWNER_ID,
            created_at: Utc::now(),
            remote_id: None,
        }
    }

    /// Builds the local record a remote record turns into on first sight.
    pub fn from_remote(remote: &RemoteRecord, now: DateTime<Utc>) -> Self {
        Self {
            local_id: remote.local_id,
            title: remote.title.trim().to_string(),
            description: None,
            is_completed: remote.is_completed,
            owner_id: remote.owner_id,
            created_at: now,
            remote_id: normalize_remote_id(Some(remote.remote_id)),
        }
    }

    /// Trims text fields and collapses empty descriptions and non-positive
    /// remote ids to `None`.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = normalize_description(self.description.as_deref());
        self.remote_id = normalize_remote_id(self.remote_id);
        self
    }

    /// True when any field the store tracks for writes differs.
    ///
    /// `local_id` and `created_at` are not tracked: neither changes after
    /// creation.
    pub fn differs_from(&self, other: &TaskRecord) -> bool {
        self.title != other.title
            || self.description != other.description
            || self.is_completed != other.is_completed
            || self.owner_id != other.owner_id
            || normalize_remote_id(self.remote_id) != normalize_remote_id(other.remote_id)
    }

    /// Case-insensitive substring match over title or description.
    /// `needle` must already be lowercased.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }
}

/// One feed item, ready to be reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub remote_id: i64,
    pub title: String,
    pub is_completed: bool,
    pub owner_id: i64,
    /// Synthesized per fetch. Only matches a local record if a caller hands
    /// the same `RemoteRecord` back in.
    pub local_id: Uuid,
}

impl RemoteRecord {
    pub fn new(remote_id: i64, title: impl Into<String>, is_completed: bool, owner_id: i64) -> Self {
        Self {
            remote_id,
            title: title.into(),
            is_completed,
            owner_id,
            local_id: Uuid::new_v4(),
        }
    }
}

pub(crate) fn normalize_remote_id(remote_id: Option<i64>) -> Option<i64> {
    remote_id.filter(|id| *id > 0)
}

pub(crate) fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Trimmed, lowercased form used for duplicate detection.
pub(crate) fn fold(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Newest first, ties by ascending local id. Matches the SQLite ordering,
/// where the id column holds the hyphenated lowercase form.
pub(crate) fn sort_newest_first(records: &mut [TaskRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.local_id.cmp(&b.local_id))
    });
}
