//! Error types for registry construction and configuration loading.

use crate::field::FieldKind;
use crate::literal::LiteralKind;

/// Errors raised while registering record types or resolving fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A field name is not declared on the record type.
    #[error("unknown field `{field}` on record type `{record_type}`")]
    UnknownField { record_type: String, field: String },

    #[error("unknown record type: {0}")]
    UnknownType(String),

    #[error("record type already registered: {0}")]
    DuplicateType(String),

    #[error("field `{field}` declared twice on record type `{record_type}`")]
    DuplicateField { record_type: String, field: String },

    #[error("custom field `{field}` has invalid id `{remote_id}` (expected digits or customfield_<digits>)")]
    InvalidCustomFieldId { field: String, remote_id: String },

    /// A scope constraint names a field the type does not declare (or
    /// declares with a different descriptor).
    #[error("scope constraint on `{record_type}` references undeclared field `{field}`")]
    ScopeFieldNotDeclared { record_type: String, field: String },

    #[error("scope constraint `{field}` on `{record_type}`: {found} value does not fit {expected} field")]
    ScopeKindMismatch {
        record_type: String,
        field: String,
        expected: FieldKind,
        found: LiteralKind,
    },
}

/// Errors raised while loading `trackql.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: I/O error: {message}")]
    Io { path: String, message: String },

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("scope constraint `{field}` on `{record_type}`: {message}")]
    ScopeValue {
        record_type: String,
        field: String,
        message: String,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
