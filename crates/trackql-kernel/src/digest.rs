//! Content digests for records.
//!
//! The filesystem store writes a record's digest next to its payload and
//! re-derives it on read, so a torn or hand-edited blob is detected rather
//! than silently evaluated.

use crate::literal::Literal;
use crate::record::RecordHandle;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex SHA-256 digest of a record's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn builder() -> ContentHashBuilder {
        ContentHashBuilder {
            hasher: Sha256::new(),
        }
    }

    /// Digest of every persisted part of a record, fed in a stable order.
    pub fn of_record(record: &RecordHandle) -> Self {
        let mut builder = Self::builder()
            .field_int("id", record.id as i64)
            .field("key", &record.key)
            .field_opt("parent_key", record.parent_key.as_deref());
        for (name, value) in &record.fields {
            builder = builder.literal(name, value);
        }
        builder.finish()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incremental content hash builder.
pub struct ContentHashBuilder {
    hasher: Sha256,
}

impl ContentHashBuilder {
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.hasher.update(name.as_bytes());
        self.hasher.update(b":");
        self.hasher.update(value.as_bytes());
        self.hasher.update(b"\n");
        self
    }

    pub fn field_int(self, name: &str, value: i64) -> Self {
        self.field(name, &value.to_string())
    }

    pub fn field_opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.field(name, v),
            None => self,
        }
    }

    /// Feed a literal, tagged by kind so `Text("1")` and `Integer(1)` differ.
    pub fn literal(self, name: &str, value: &Literal) -> Self {
        match value {
            Literal::Text(v) => self.field(&format!("{name}/text"), v),
            Literal::UserRef(v) => self.field(&format!("{name}/user"), v),
            Literal::RecordRef(v) => self.field(&format!("{name}/record"), v),
            Literal::Integer(v) => self.field_int(&format!("{name}/integer"), *v),
            Literal::Date(v) => self.field(&format!("{name}/date"), &v.to_rfc3339()),
            Literal::Collection(items) => {
                let mut builder = self.field_int(&format!("{name}/collection"), items.len() as i64);
                for (index, item) in items.iter().enumerate() {
                    builder = builder.literal(&format!("{name}[{index}]"), item);
                }
                builder
            }
        }
    }

    pub fn finish(self) -> ContentHash {
        let hash = self.hasher.finalize();
        ContentHash(format!("{hash:x}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_distinguishes_literal_kinds() {
        let text = RecordHandle::new("DEV-1").with_field("points", "1");
        let int = RecordHandle::new("DEV-1").with_field("points", 1_i64);
        assert_ne!(ContentHash::of_record(&text), ContentHash::of_record(&int));
    }

    #[test]
    fn digest_is_stable_for_equal_records() {
        let a = RecordHandle::new("DEV-1")
            .with_field("summary", "fix")
            .with_field("labels", Literal::collection(["x", "y"]));
        let b = a.clone();
        assert_eq!(ContentHash::of_record(&a), ContentHash::of_record(&b));
        assert_eq!(ContentHash::of_record(&a).0.len(), 64);
    }
}
