//! The record store contract shared by both backends, plus key and id
//! assignment.

use crate::error::StoreError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use trackql_kernel::{RecordHandle, RecordPatch, RecordSnapshot};

/// First id handed out by a fresh store.
pub const FIRST_RECORD_ID: u64 = 10_000;

/// Field whose text value names the key prefix of a new record.
pub const PROJECT_FIELD: &str = "project";

/// One logical record store.
///
/// Every operation checks `cancel` before doing work. A cancelled mutation
/// leaves the store as it was after its last fully-applied mutation.
///
/// Mutators take `&self`: each backend scopes its own locking, so callers
/// share a store without an outer lock. A key that can never name a record
/// behaves like an absent one.
pub trait RecordStore: Send + Sync {
    /// Insert a record, assigning key and id when unset. Returns the key.
    fn insert(&self, record: RecordHandle, cancel: &CancellationToken)
    -> Result<String, StoreError>;

    /// Apply a partial update; `NotFound` when `key` is absent.
    fn update(
        &self,
        key: &str,
        patch: &RecordPatch,
        cancel: &CancellationToken,
    ) -> Result<RecordHandle, StoreError>;

    /// Remove a record; `NotFound` when `key` is absent.
    fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<RecordHandle, StoreError>;

    fn get(&self, key: &str) -> Result<Option<RecordHandle>, StoreError>;

    /// Point-in-time view of every record with key and child indexes.
    fn snapshot(&self, cancel: &CancellationToken) -> Result<Arc<RecordSnapshot>, StoreError>;
}

/// Id and per-prefix key counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub next_id: u64,
    #[serde(default)]
    pub next_number: BTreeMap<String, u64>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            next_id: FIRST_RECORD_ID,
            next_number: BTreeMap::new(),
        }
    }
}

impl Sequence {
    pub fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn take_key(&mut self, prefix: &str) -> String {
        let slot = self.next_number.entry(prefix.to_string()).or_insert(1);
        let key = format!("{prefix}-{slot}");
        *slot += 1;
        key
    }

    /// Advance counters past an externally chosen id and key.
    pub fn observe(&mut self, record: &RecordHandle) {
        self.next_id = self.next_id.max(record.id.saturating_add(1));
        if let Some((prefix, number)) = split_key(&record.key) {
            let slot = self.next_number.entry(prefix.to_string()).or_insert(1);
            *slot = (*slot).max(number.saturating_add(1));
        }
    }

    /// Give `record` a key and id if it lacks them.
    ///
    /// `exists` reports keys already taken; generated keys skip them and an
    /// explicit key that is taken fails with `AlreadyExists`.
    pub fn assign(
        &mut self,
        record: &mut RecordHandle,
        default_prefix: &str,
        exists: impl Fn(&str) -> bool,
    ) -> Result<(), StoreError> {
        if record.key.is_empty() {
            let prefix = key_prefix(record, default_prefix);
            loop {
                let key = self.take_key(&prefix);
                if !exists(&key) {
                    record.key = key;
                    break;
                }
            }
        } else {
            validate_key(&record.key)?;
            if exists(&record.key) {
                return Err(StoreError::AlreadyExists(record.key.clone()));
            }
        }

        if record.id == 0 {
            record.id = self.take_id();
        }
        self.observe(record);
        Ok(())
    }
}

fn key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$").expect("record key regex must compile")
    })
}

fn prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,31}$").expect("key prefix regex must compile")
    })
}

/// Keys double as blob file names, so they are restricted to a safe alphabet.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key_re().is_match(key) {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Prefix for a generated key: the record's project when usable.
pub fn key_prefix(record: &RecordHandle, default_prefix: &str) -> String {
    record
        .field(PROJECT_FIELD)
        .and_then(|value| value.as_text())
        .filter(|project| prefix_re().is_match(project))
        .unwrap_or(default_prefix)
        .to_string()
}

fn split_key(key: &str) -> Option<(&str, u64)> {
    let (prefix, number) = key.rsplit_once('-')?;
    Some((prefix, number.parse().ok()?))
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}
