//! Volatile in-process record store.
//!
//! Records live in a copy-on-write `Arc<RecordSnapshot>` behind an internal
//! `RwLock`: `snapshot()` is a reference-count bump under the read side, and
//! a mutation only copies when an evaluation still holds the previous
//! snapshot. Inserts take the sequence mutex before the records lock.

use crate::error::StoreError;
use crate::store::{RecordStore, Sequence, check_cancelled};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use trackql_kernel::config::DEFAULT_KEY_PREFIX;
use trackql_kernel::{RecordHandle, RecordPatch, RecordSnapshot};

#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<Arc<RecordSnapshot>>,
    sequence: Mutex<Sequence>,
    default_prefix: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(default_prefix: impl Into<String>) -> Self {
        Self {
            records: RwLock::new(Arc::new(RecordSnapshot::new())),
            sequence: Mutex::new(Sequence::default()),
            default_prefix: default_prefix.into(),
        }
    }

    /// Seed a store; later records win on duplicate keys.
    pub fn from_records(records: impl IntoIterator<Item = RecordHandle>) -> Self {
        let snapshot = RecordSnapshot::from_records(records);
        let mut sequence = Sequence::default();
        for record in snapshot.records() {
            sequence.observe(record);
        }
        Self {
            records: RwLock::new(Arc::new(snapshot)),
            sequence: Mutex::new(sequence),
            default_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<RecordSnapshot>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<RecordSnapshot>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sequence(&self) -> MutexGuard<'_, Sequence> {
        self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryStore {
    fn insert(
        &self,
        mut record: RecordHandle,
        cancel: &CancellationToken,
    ) -> Result<String, StoreError> {
        check_cancelled(cancel)?;
        let mut sequence = self.sequence();
        let mut records = self.write();
        sequence.assign(&mut record, &self.default_prefix, |key| records.contains(key))?;
        let key = record.key.clone();
        tracing::debug!(key = %key, id = record.id, "memory store insert");
        Arc::make_mut(&mut *records).insert(record);
        Ok(key)
    }

    fn update(
        &self,
        key: &str,
        patch: &RecordPatch,
        cancel: &CancellationToken,
    ) -> Result<RecordHandle, StoreError> {
        check_cancelled(cancel)?;
        let mut records = self.write();
        let mut record = records
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        record.apply(patch);
        tracing::debug!(key, "memory store update");
        Arc::make_mut(&mut *records).insert(record.clone());
        Ok(record)
    }

    fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<RecordHandle, StoreError> {
        check_cancelled(cancel)?;
        let mut records = self.write();
        if !records.contains(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        tracing::debug!(key, "memory store delete");
        Arc::make_mut(&mut *records)
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<RecordHandle>, StoreError> {
        Ok(self.read().get(key).cloned())
    }

    fn snapshot(&self, cancel: &CancellationToken) -> Result<Arc<RecordSnapshot>, StoreError> {
        check_cancelled(cancel)?;
        Ok(Arc::clone(&*self.read()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackql_kernel::Literal;

    fn live() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn insert_assigns_sequential_keys_and_ids() {
        let store = MemoryStore::new();
        let first = store
            .insert(RecordHandle::unkeyed().with_field("project", "DEV"), &live())
            .expect("insert should succeed");
        let second = store
            .insert(RecordHandle::unkeyed(), &live())
            .expect("insert should succeed");
        assert_eq!(first, "DEV-1");
        assert_eq!(second, "REC-1");

        let record = store.get("DEV-1").expect("get").expect("present");
        assert_eq!(record.id, 10_000);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_mutation() {
        let store = MemoryStore::from_records(vec![RecordHandle::new("DEV-1").with_field("summary", "old")]);
        let before = store.snapshot(&live()).expect("snapshot");

        store
            .update("DEV-1", &RecordPatch::new().set("summary", "new"), &live())
            .expect("update should succeed");
        store
            .insert(RecordHandle::new("DEV-2"), &live())
            .expect("insert should succeed");

        assert_eq!(before.len(), 1);
        assert_eq!(
            before.get("DEV-1").and_then(|r| r.field("summary")),
            Some(&Literal::text("old"))
        );
        let after = store.snapshot(&live()).expect("snapshot");
        assert_eq!(after.len(), 2);
        assert_eq!(
            after.get("DEV-1").and_then(|r| r.field("summary")),
            Some(&Literal::text("new"))
        );
    }

    #[test]
    fn update_and_delete_missing_record_fail_not_found() {
        let store = MemoryStore::new();
        match store.update("DEV-404", &RecordPatch::new(), &live()) {
            Err(StoreError::NotFound(key)) => assert_eq!(key, "DEV-404"),
            other => panic!("expected not found, got {other:?}"),
        }
        match store.delete("DEV-404", &live()) {
            Err(StoreError::NotFound(key)) => assert_eq!(key, "DEV-404"),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn reparenting_updates_child_index() {
        let store = MemoryStore::from_records(vec![
            RecordHandle::new("DEV-1"),
            RecordHandle::new("DEV-2"),
            RecordHandle::new("DEV-3").with_parent("DEV-1"),
        ]);
        store
            .update(
                "DEV-3",
                &RecordPatch::new().reparent(Some("DEV-2".to_string())),
                &live(),
            )
            .expect("update should succeed");

        let snapshot = store.snapshot(&live()).expect("snapshot");
        assert_eq!(snapshot.children_of("DEV-1").count(), 0);
        let children: Vec<&str> = snapshot
            .children_of("DEV-2")
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(children, vec!["DEV-3"]);
    }

    #[test]
    fn cancelled_mutation_leaves_store_untouched() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            store.insert(RecordHandle::unkeyed(), &cancel),
            Err(StoreError::Cancelled)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn shared_store_accepts_concurrent_inserts() {
        let store = Arc::new(MemoryStore::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| {
                            store
                                .insert(RecordHandle::unkeyed(), &live())
                                .expect("insert should succeed")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut keys = std::collections::BTreeSet::new();
        for worker in workers {
            for key in worker.join().expect("worker should finish") {
                assert!(keys.insert(key), "duplicate key assigned");
            }
        }
        assert_eq!(keys.len(), 40);
        assert_eq!(store.len(), 40);
    }
}
