//! Shared-filesystem record store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/sequence.json         id and key counters (own lock)
//! <root>/records/<key>.json    one blob per record
//! <root>/records/<key>.json.lock
//! ```
//!
//! Every mutation locks exactly one unit at a time; there is no store-wide
//! lock and no cross-record transaction. Readers take no locks and rely on
//! atomic blob replacement.

use crate::blob;
use crate::error::StoreError;
use crate::lock::{LockPolicy, UnitLockGuard};
use crate::store::{RecordStore, Sequence, check_cancelled, validate_key};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trackql_kernel::{RecordHandle, RecordPatch, RecordSnapshot, StoreSettings};

const RECORDS_DIR: &str = "records";
const SEQUENCE_FILE: &str = "sequence.json";
const BLOB_EXTENSION: &str = "json";

/// Handle to a store directory; cheap to clone, many handles (and
/// processes) may share one root.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    default_prefix: String,
    policy: LockPolicy,
}

impl FsStore {
    /// Open (creating if needed) the store at `settings.root`.
    pub fn open(settings: &StoreSettings) -> Result<Self, StoreError> {
        let store = Self {
            root: settings.root.clone(),
            default_prefix: settings.default_prefix.clone(),
            policy: LockPolicy::new(settings.lock_retries, settings.lock_backoff_ms),
        };
        let records_dir = store.records_dir();
        fs::create_dir_all(&records_dir)
            .map_err(|e| StoreError::Io(format!("{}: {e}", records_dir.display())))?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    fn sequence_path(&self) -> PathBuf {
        self.root.join(SEQUENCE_FILE)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.records_dir().join(format!("{key}.{BLOB_EXTENSION}"))
    }

    /// Reserve a key and id for `record` under the sequence lock.
    fn reserve(
        &self,
        record: &mut RecordHandle,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let path = self.sequence_path();
        let _guard = UnitLockGuard::acquire(&path, SEQUENCE_FILE, self.policy, cancel)?;
        let mut sequence: Sequence = blob::read_json(&path)?.unwrap_or_default();
        sequence.assign(record, &self.default_prefix, |key| {
            self.record_path(key).exists()
        })?;
        blob::write_json(&path, &sequence)
    }

    /// Lock an existing record's unit. A key outside the blob alphabet can
    /// never have been stored, so it reports `NotFound` and never reaches a
    /// path.
    fn lock_record(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, UnitLockGuard), StoreError> {
        if validate_key(key).is_err() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let path = self.record_path(key);
        let guard = UnitLockGuard::acquire(&path, key, self.policy, cancel)?;
        Ok((path, guard))
    }

    /// Keys of every record blob currently on disk, sorted.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.records_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(format!("{}: {err}", dir.display()))),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(format!("{}: {e}", dir.display())))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
                && validate_key(stem).is_ok()
            {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl RecordStore for FsStore {
    fn insert(
        &self,
        mut record: RecordHandle,
        cancel: &CancellationToken,
    ) -> Result<String, StoreError> {
        check_cancelled(cancel)?;
        self.reserve(&mut record, cancel)?;

        let (path, _guard) = self.lock_record(&record.key, cancel)?;
        if path.exists() {
            return Err(StoreError::AlreadyExists(record.key));
        }
        blob::write_record(&path, &record)?;
        tracing::debug!(key = %record.key, id = record.id, "fs store insert");
        Ok(record.key)
    }

    fn update(
        &self,
        key: &str,
        patch: &RecordPatch,
        cancel: &CancellationToken,
    ) -> Result<RecordHandle, StoreError> {
        check_cancelled(cancel)?;
        let (path, _guard) = self.lock_record(key, cancel)?;
        let mut record =
            blob::read_record(&path)?.ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        record.apply(patch);
        blob::write_record(&path, &record)?;
        tracing::debug!(key, "fs store update");
        Ok(record)
    }

    fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<RecordHandle, StoreError> {
        check_cancelled(cancel)?;
        let (path, _guard) = self.lock_record(key, cancel)?;
        let record =
            blob::read_record(&path)?.ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if !blob::remove(&path)? {
            return Err(StoreError::NotFound(key.to_string()));
        }
        tracing::debug!(key, "fs store delete");
        Ok(record)
    }

    fn get(&self, key: &str) -> Result<Option<RecordHandle>, StoreError> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        blob::read_record(&self.record_path(key))
    }

    /// Each blob is read whole, but blobs replaced mid-scan may mix
    /// generations; a blob deleted mid-scan is skipped.
    fn snapshot(&self, cancel: &CancellationToken) -> Result<Arc<RecordSnapshot>, StoreError> {
        let mut records = Vec::new();
        for key in self.keys()? {
            check_cancelled(cancel)?;
            if let Some(record) = blob::read_record(&self.record_path(&key))? {
                records.push(record);
            }
        }
        tracing::debug!(records = records.len(), "fs store snapshot");
        Ok(Arc::new(RecordSnapshot::from_records(records)))
    }
}
