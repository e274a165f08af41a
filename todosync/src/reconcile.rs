//! Remote/local task reconciliation.
//!
//! Each incoming [`RemoteRecord`] is classified against a snapshot of the
//! local records taken at the start of a sync pass. Matching is by remote id
//! first; the local-id lookup only succeeds when a caller hands back a
//! `RemoteRecord` whose synthesized id was already stored, which a normal
//! fetch never does. Neither lookup ever deletes anything.
//!
//! Classification is pure: [`classify`] reads the snapshot and returns a
//! [`Decision`]. The caller applies it and keeps the index current with
//! [`SnapshotIndex::record_insert`] / [`SnapshotIndex::record_update`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::record::{RemoteRecord, TaskRecord, normalize_remote_id};

/// What a sync pass must do with one remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No local record matched; store this new one.
    Insert(TaskRecord),
    /// The local record at `slot` differs; replace it with `record`.
    Update { slot: usize, record: TaskRecord },
    /// The local record at `slot` already matches.
    Unchanged { slot: usize },
}

/// Lookup tables over one snapshot, keyed to positions in the slice they
/// were built from.
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    by_remote_id: HashMap<i64, usize>,
    by_local_id: HashMap<Uuid, usize>,
    shadowed: usize,
}

impl SnapshotIndex {
    /// Index `records` in their given order.
    ///
    /// When two records share a positive remote id, the first one in
    /// snapshot order represents that id. The rest stay in the store but are
    /// never matched by remote id.
    pub fn build(records: &[TaskRecord]) -> Self {
        let mut index = Self {
            by_remote_id: HashMap::with_capacity(records.len()),
            by_local_id: HashMap::with_capacity(records.len()),
            shadowed: 0,
        };
        for (slot, record) in records.iter().enumerate() {
            index.by_local_id.entry(record.local_id).or_insert(slot);
            if let Some(remote_id) = normalize_remote_id(record.remote_id) {
                if let Some(&kept) = index.by_remote_id.get(&remote_id) {
                    log::warn!(
                        "Tasks {} and {} share remote id {}; matching only the first",
                        records[kept].local_id,
                        record.local_id,
                        remote_id
                    );
                    index.shadowed += 1;
                } else {
                    index.by_remote_id.insert(remote_id, slot);
                }
            }
        }
        index
    }

    pub fn by_remote_id(&self, remote_id: i64) -> Option<usize> {
        normalize_remote_id(Some(remote_id)).and_then(|id| self.by_remote_id.get(&id).copied())
    }

    pub fn by_local_id(&self, local_id: &Uuid) -> Option<usize> {
        self.by_local_id.get(local_id).copied()
    }

    /// Records that share a remote id with an earlier record and are
    /// therefore unreachable by remote id.
    pub fn shadowed(&self) -> usize {
        self.shadowed
    }

    /// Register a record appended at `slot` during the current pass.
    pub fn record_insert(&mut self, slot: usize, record: &TaskRecord) {
        self.by_local_id.entry(record.local_id).or_insert(slot);
        if let Some(remote_id) = normalize_remote_id(record.remote_id) {
            self.by_remote_id.entry(remote_id).or_insert(slot);
        }
    }

    /// Re-key `slot` after its remote id changed from `before` to `after`.
    pub fn record_update(&mut self, slot: usize, before: &TaskRecord, after: &TaskRecord) {
        let old = normalize_remote_id(before.remote_id);
        let new = normalize_remote_id(after.remote_id);
        if old == new {
            return;
        }
        if let Some(old) = old {
            if self.by_remote_id.get(&old) == Some(&slot) {
                self.by_remote_id.remove(&old);
            }
        }
        if let Some(new) = new {
            self.by_remote_id.entry(new).or_insert(slot);
        }
    }
}

/// Decide what to do with `remote` given the current working set.
///
/// `records` must be the slice `index` was built from, plus anything the
/// caller has appended and registered since.
pub fn classify(
    remote: &RemoteRecord,
    index: &SnapshotIndex,
    records: &[TaskRecord],
    now: DateTime<Utc>,
) -> Decision {
    let matched = index
        .by_remote_id(remote.remote_id)
        .or_else(|| index.by_local_id(&remote.local_id));

    match matched {
        Some(slot) => {
            let local = &records[slot];
            let merged = merge(local, remote);
            if merged.differs_from(local) {
                Decision::Update {
                    slot,
                    record: merged,
                }
            } else {
                Decision::Unchanged { slot }
            }
        }
        None => Decision::Insert(TaskRecord::from_remote(remote, now)),
    }
}

/// The local record with every field the feed owns overwritten.
/// Description and creation time stay local.
fn merge(local: &TaskRecord, remote: &RemoteRecord) -> TaskRecord {
    TaskRecord {
        title: remote.title.trim().to_string(),
        is_completed: remote.is_completed,
        owner_id: remote.owner_id,
        remote_id: normalize_remote_id(Some(remote.remote_id)),
        ..local.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DEFAULT_OWNER_ID;

    fn local(title: &str, remote_id: Option<i64>) -> TaskRecord {
        TaskRecord {
            remote_id,
            ..TaskRecord::new_local(title, None)
        }
    }

    #[test]
    fn test_unknown_remote_id_inserts() {
        let records = vec![local("other", Some(1))];
        let index = SnapshotIndex::build(&records);
        let remote = RemoteRecord::new(2, "new", false, 5);
        let now = Utc::now();

        match classify(&remote, &index, &records, now) {
            Decision::Insert(record) => {
                assert_eq!(record.remote_id, Some(2));
                assert_eq!(record.description, None);
                assert_eq!(record.created_at, now);
                assert_eq!(record.owner_id, 5);
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn test_matching_fields_unchanged() {
        let mut existing = local("Read book", Some(9));
        existing.owner_id = DEFAULT_OWNER_ID;
        let records = vec![existing];
        let index = SnapshotIndex::build(&records);
        let remote = RemoteRecord::new(9, "Read book", false, DEFAULT_OWNER_ID);

        assert_eq!(
            classify(&remote, &index, &records, Utc::now()),
            Decision::Unchanged { slot: 0 }
        );
    }

    #[test]
    fn test_padded_remote_title_is_unchanged() {
        let records = vec![local("Read book", Some(9))];
        let index = SnapshotIndex::build(&records);
        let remote = RemoteRecord::new(9, "  Read book ", false, DEFAULT_OWNER_ID);

        assert_eq!(
            classify(&remote, &index, &records, Utc::now()),
            Decision::Unchanged { slot: 0 }
        );
    }

    #[test]
    fn test_changed_title_updates_and_keeps_description() {
        let mut existing = local("A", Some(4));
        existing.description = Some("kept".into());
        let created_at = existing.created_at;
        let records = vec![existing];
        let index = SnapshotIndex::build(&records);
        let remote = RemoteRecord::new(4, "B", true, DEFAULT_OWNER_ID);

        match classify(&remote, &index, &records, Utc::now()) {
            Decision::Update { slot, record } => {
                assert_eq!(slot, 0);
                assert_eq!(record.title, "B");
                assert!(record.is_completed);
                assert_eq!(record.description.as_deref(), Some("kept"));
                assert_eq!(record.created_at, created_at);
                assert_eq!(record.local_id, records[0].local_id);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_local_only_record_never_matched_by_remote_id() {
        let records = vec![local("Buy milk", None)];
        let index = SnapshotIndex::build(&records);
        let remote = RemoteRecord::new(1, "Buy milk", false, DEFAULT_OWNER_ID);

        assert!(matches!(
            classify(&remote, &index, &records, Utc::now()),
            Decision::Insert(_)
        ));
    }

    #[test]
    fn test_local_id_fallback_adopts_remote_id() {
        let remote = RemoteRecord::new(12, "Same", false, DEFAULT_OWNER_ID);
        let mut existing = local("Same", None);
        existing.local_id = remote.local_id;
        let records = vec![existing];
        let index = SnapshotIndex::build(&records);

        match classify(&remote, &index, &records, Utc::now()) {
            Decision::Update { slot, record } => {
                assert_eq!(slot, 0);
                assert_eq!(record.remote_id, Some(12));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_remote_ids_first_wins() {
        let records = vec![local("first", Some(3)), local("second", Some(3))];
        let index = SnapshotIndex::build(&records);

        assert_eq!(index.by_remote_id(3), Some(0));
        assert_eq!(index.shadowed(), 1);
        assert_eq!(index.by_local_id(&records[1].local_id), Some(1));
    }

    #[test]
    fn test_non_positive_remote_id_never_looked_up() {
        let records = vec![local("zero", Some(0))];
        let index = SnapshotIndex::build(&records);
        assert_eq!(index.by_remote_id(0), None);
        assert_eq!(index.by_remote_id(-1), None);
    }

    #[test]
    fn test_record_insert_makes_remote_id_matchable() {
        let mut records = Vec::new();
        let mut index = SnapshotIndex::build(&records);
        let first = RemoteRecord::new(8, "x", false, 1);
        let Decision::Insert(record) = classify(&first, &index, &records, Utc::now()) else {
            panic!("expected insert");
        };
        index.record_insert(records.len(), &record);
        records.push(record);

        let again = RemoteRecord::new(8, "x", false, 1);
        assert_eq!(
            classify(&again, &index, &records, Utc::now()),
            Decision::Unchanged { slot: 0 }
        );
    }

    #[test]
    fn test_record_update_rekeys_remote_id() {
        let before = local("t", Some(1));
        let after = TaskRecord {
            remote_id: Some(2),
            ..before.clone()
        };
        let mut index = SnapshotIndex::build(std::slice::from_ref(&before));
        index.record_update(0, &before, &after);
        assert_eq!(index.by_remote_id(1), None);
        assert_eq!(index.by_remote_id(2), Some(0));
    }
}
