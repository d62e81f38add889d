//! Field descriptors: how a declared field is compared and rendered.

use crate::literal::Literal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value category of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Date,
    User,
    Reference,
    Collection,
    Custom,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Date => "date",
            Self::User => "user",
            Self::Reference => "reference",
            Self::Collection => "collection",
            Self::Custom => "custom",
        }
    }

    /// Normalize a literal used as a query operand against this field kind.
    ///
    /// Text spellings of users and record keys are promoted to their typed
    /// literal. Returns `None` when the literal cannot be compared against
    /// the field at all.
    pub fn coerce_operand(self, literal: &Literal) -> Option<Literal> {
        match (self, literal) {
            (_, Literal::Collection(_)) => None,
            (Self::Text, Literal::Text(_)) => Some(literal.clone()),
            (Self::Date, Literal::Date(_)) => Some(literal.clone()),
            (Self::User, Literal::Text(value) | Literal::UserRef(value)) => {
                Some(Literal::UserRef(value.clone()))
            }
            (Self::Reference, Literal::Text(value) | Literal::RecordRef(value)) => {
                Some(Literal::RecordRef(value.clone()))
            }
            (Self::Collection, Literal::Text(_) | Literal::UserRef(_) | Literal::RecordRef(_)) => {
                Some(literal.clone())
            }
            (Self::Collection, Literal::Integer(_)) => Some(literal.clone()),
            (Self::Custom, _) => Some(literal.clone()),
            _ => None,
        }
    }

    /// Normalize a value about to be stored in a field of this kind.
    ///
    /// Like `coerce_operand`, except a collection field stores a collection:
    /// a scalar becomes a one-element collection and every element must
    /// coerce on its own.
    pub fn coerce_value(self, literal: &Literal) -> Option<Literal> {
        match (self, literal) {
            (Self::Collection, Literal::Collection(items)) => items
                .iter()
                .map(|item| self.coerce_operand(item))
                .collect::<Option<Vec<_>>>()
                .map(Literal::Collection),
            (Self::Collection, scalar) => self
                .coerce_operand(scalar)
                .map(|item| Literal::Collection(vec![item])),
            _ => self.coerce_operand(literal),
        }
    }

    /// Whether `>`, `>=`, `<`, `<=` are meaningful for this kind.
    pub fn supports_ordering(self) -> bool {
        matches!(self, Self::Date | Self::Custom)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "date" => Ok(Self::Date),
            "user" => Ok(Self::User),
            "reference" => Ok(Self::Reference),
            "collection" => Ok(Self::Collection),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown field kind: {other}")),
        }
    }
}

/// A declared field of a record type.
///
/// `remote_id` is the service's built-in field name, or the numeric id of a
/// custom field (normalized to digits at registration).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub remote_id: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, remote_id: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            remote_id: remote_id.into(),
            kind,
        }
    }

    /// A built-in field whose remote name equals its declared name.
    pub fn builtin(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            remote_id: name.clone(),
            name,
            kind,
        }
    }

    /// A custom field addressed by its numeric id.
    pub fn custom(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: name.into(),
            remote_id: id.to_string(),
            kind: FieldKind::Custom,
        }
    }

    /// Identifier used inside query text.
    pub fn query_identifier(&self) -> String {
        match self.kind {
            FieldKind::Custom => format!("cf[{}]", self.remote_id),
            _ => self.remote_id.clone(),
        }
    }

    /// Identifier used in the request's field list.
    pub fn request_identifier(&self) -> String {
        match self.kind {
            FieldKind::Custom => format!("customfield_{}", self.remote_id),
            _ => self.remote_id.clone(),
        }
    }
}
