//! One JSON blob per record, written atomically and verified on read.
//!
//! Writes go to a unique temporary sibling, are fsynced, then renamed over
//! the target, so a concurrent reader sees either the old blob or the new
//! one. Each blob carries the record's content digest; a mismatch on read is
//! reported as `Corrupt`.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use trackql_kernel::{ContentHash, RecordHandle};

#[derive(Debug, Serialize, Deserialize)]
struct RecordBlob {
    digest: ContentHash,
    record: RecordHandle,
}

/// Read and verify one record blob; `None` when the blob does not exist.
pub fn read_record(path: &Path) -> Result<Option<RecordHandle>, StoreError> {
    let Some(blob) = read_json::<RecordBlob>(path)? else {
        return Ok(None);
    };
    let actual = ContentHash::of_record(&blob.record);
    if actual != blob.digest {
        return Err(StoreError::Corrupt(format!(
            "{}: digest mismatch (stored {}, computed {actual})",
            path.display(),
            blob.digest
        )));
    }
    Ok(Some(blob.record))
}

pub fn write_record(path: &Path, record: &RecordHandle) -> Result<(), StoreError> {
    let blob = RecordBlob {
        digest: ContentHash::of_record(record),
        record: record.clone(),
    };
    write_json(path, &blob)
}

/// Read a JSON unit; `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::Io(format!("{}: {err}", path.display()))),
    };
    validate_blob_bytes(path, &bytes)?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))
}

/// Atomically replace `path` with the JSON encoding of `value`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::Io(format!("{}: {e}", parent.display())))?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), StoreError> {
        let file = File::create(&tmp_path)
            .map_err(|e| StoreError::Io(format!("{}: {e}", tmp_path.display())))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| StoreError::Io(format!("{}: {e}", tmp_path.display())))?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Io(format!("{}: {e}", tmp_path.display())))?;
        file.sync_all()
            .map_err(|e| StoreError::Io(format!("{}: {e}", tmp_path.display())))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::Io(format!(
            "{} -> {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    sync_parent(path)
}

/// Remove a unit; `false` when it was already gone.
pub fn remove(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => {
            sync_parent(path)?;
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StoreError::Io(format!("{}: {err}", path.display()))),
    }
}

fn sync_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent)
            .map_err(|e| StoreError::Io(format!("{}: {e}", parent.display())))?;
        dir.sync_all()
            .map_err(|e| StoreError::Io(format!("{}: {e}", parent.display())))?;
    }
    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(
        ".tmp.{}.{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));
    PathBuf::from(tmp)
}

fn validate_blob_bytes(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if bytes.contains(&0) {
        return Err(StoreError::Corrupt(format!(
            "{}: contains NUL byte(s)",
            path.display()
        )));
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(StoreError::Corrupt(format!(
            "{}: contains non-UTF-8 byte sequence(s)",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackql_kernel::Literal;

    fn sample() -> RecordHandle {
        let mut record = RecordHandle::new("DEV-1")
            .with_field("summary", "fix")
            .with_field("assignee", Literal::user("dev1"));
        record.id = 10_000;
        record
    }

    #[test]
    fn write_then_read_verifies_digest() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let path = dir.path().join("records").join("DEV-1.json");
        write_record(&path, &sample()).expect("write should succeed");
        let read = read_record(&path).expect("read should succeed");
        assert_eq!(read, Some(sample()));

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("records"))
            .expect("dir should list")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn hand_edited_blob_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let path = dir.path().join("DEV-1.json");
        write_record(&path, &sample()).expect("write should succeed");
        let edited = fs::read_to_string(&path)
            .expect("blob should read")
            .replace("\"fix\"", "\"tampered\"");
        fs::write(&path, edited).expect("fixture should write");

        match read_record(&path) {
            Err(StoreError::Corrupt(message)) => assert!(message.contains("digest mismatch")),
            other => panic!("expected corrupt blob error, got {other:?}"),
        }
    }

    #[test]
    fn nul_and_non_utf8_payloads_are_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let nul = dir.path().join("nul.json");
        fs::write(&nul, b"{\"digest\":\"x\"}\0").expect("fixture should write");
        match read_record(&nul) {
            Err(StoreError::Corrupt(message)) => assert!(message.contains("contains NUL")),
            other => panic!("expected corrupt blob error, got {other:?}"),
        }

        let binary = dir.path().join("binary.json");
        fs::write(&binary, [0xff, 0xfe, 0xfd]).expect("fixture should write");
        match read_record(&binary) {
            Err(StoreError::Corrupt(message)) => assert!(message.contains("non-UTF-8")),
            other => panic!("expected corrupt blob error, got {other:?}"),
        }
    }

    #[test]
    fn missing_blob_reads_as_none_and_remove_reports_absence() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let path = dir.path().join("DEV-9.json");
        assert_eq!(read_record(&path).expect("read should succeed"), None);
        assert!(!remove(&path).expect("remove should succeed"));
    }
}
