//! Record handles: one tracked item inside a record store.

use crate::literal::Literal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One tracked item.
///
/// `fields` is keyed by declared field name. An `id` of zero and an empty
/// `key` mean "not yet assigned"; stores fill both on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHandle {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Literal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
}

impl RecordHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: 0,
            key: key.into(),
            fields: BTreeMap::new(),
            parent_key: None,
        }
    }

    /// A record with neither key nor id; the store assigns both.
    pub fn unkeyed() -> Self {
        Self::new(String::new())
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Literal> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Literal>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Copy of this record carrying only the named fields.
    pub fn project<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut fields = BTreeMap::new();
        for name in names {
            if let Some(value) = self.fields.get(name) {
                fields.insert(name.to_string(), value.clone());
            }
        }
        Self {
            id: self.id,
            key: self.key.clone(),
            fields,
            parent_key: self.parent_key.clone(),
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &RecordPatch) {
        for name in &patch.unset {
            self.fields.remove(name);
        }
        for (name, value) in &patch.set {
            self.fields.insert(name.clone(), value.clone());
        }
        if let Some(parent_key) = &patch.parent_key {
            self.parent_key = parent_key.clone();
        }
    }
}

/// Partial update for one record.
///
/// `unset` is applied before `set`, so a field named in both ends up set.
/// `parent_key: Some(None)` detaches the record from its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Literal>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unset: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<Option<String>>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.set.insert(name.into(), value.into());
        self
    }

    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.unset.insert(name.into());
        self
    }

    pub fn reparent(mut self, parent_key: Option<String>) -> Self {
        self.parent_key = Some(parent_key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.parent_key.is_none()
    }
}
