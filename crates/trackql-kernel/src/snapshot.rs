//! Point-in-time record set with the key and parent/child indexes.
//!
//! Both store backends hand the evaluator a `RecordSnapshot`. The indexes
//! are maintained incrementally on insert/remove so subquery evaluation
//! never has to scan for parents or children.

use crate::record::RecordHandle;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSnapshot {
    records: BTreeMap<String, RecordHandle>,
    children: BTreeMap<String, BTreeSet<String>>,
    order: BTreeSet<(u64, String)>,
}

impl RecordSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from materialized records.
    ///
    /// Duplicate keys resolve last-write-wins.
    pub fn from_records(records: impl IntoIterator<Item = RecordHandle>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    /// Insert or replace a record by key, returning the previous value.
    pub fn insert(&mut self, record: RecordHandle) -> Option<RecordHandle> {
        let previous = self.remove(&record.key);
        if let Some(parent_key) = &record.parent_key {
            self.children
                .entry(parent_key.clone())
                .or_default()
                .insert(record.key.clone());
        }
        self.order.insert((record.id, record.key.clone()));
        self.records.insert(record.key.clone(), record);
        previous
    }

    pub fn remove(&mut self, key: &str) -> Option<RecordHandle> {
        let record = self.records.remove(key)?;
        if let Some(parent_key) = &record.parent_key
            && let Some(siblings) = self.children.get_mut(parent_key)
        {
            siblings.remove(key);
            if siblings.is_empty() {
                self.children.remove(parent_key);
            }
        }
        self.order.remove(&(record.id, record.key.clone()));
        Some(record)
    }

    pub fn get(&self, key: &str) -> Option<&RecordHandle> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Parent of `record`, when its parent key resolves in this snapshot.
    pub fn parent_of(&self, record: &RecordHandle) -> Option<&RecordHandle> {
        record
            .parent_key
            .as_deref()
            .and_then(|parent_key| self.records.get(parent_key))
    }

    /// Children whose parent key is `key`, in key order.
    pub fn children_of<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a RecordHandle> + 'a {
        self.children
            .get(key)
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter_map(|child| self.records.get(child))
    }

    /// All records in ascending id order (key order among equal ids).
    pub fn records(&self) -> impl Iterator<Item = &RecordHandle> {
        self.order
            .iter()
            .filter_map(|(_, key)| self.records.get(key))
    }

    /// Highest assigned id, or zero for an empty snapshot.
    pub fn max_id(&self) -> u64 {
        self.order.last().map(|(id, _)| *id).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
