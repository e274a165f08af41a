//! Notifications emitted after the store commits a write.

use uuid::Uuid;

use crate::store::SyncSummary;

/// The kind of write that was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    /// A reconcile pass committed; carries its tallies.
    Reconciled(SyncSummary),
}

/// Lightweight event broadcast by [`TaskStore`](crate::TaskStore) after each
/// successful commit. Subscribers re-read the store to refresh their view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    /// The affected task, or `None` for a reconcile pass.
    pub local_id: Option<Uuid>,
}

impl ChangeNotification {
    pub fn task(kind: ChangeKind, local_id: Uuid) -> Self {
        Self {
            kind,
            local_id: Some(local_id),
        }
    }

    pub fn reconciled(summary: SyncSummary) -> Self {
        Self {
            kind: ChangeKind::Reconciled(summary),
            local_id: None,
        }
    }
}
