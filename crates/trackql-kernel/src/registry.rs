//! Field registry: record types, their declared fields, and scope.
//!
//! A record type *has* an ordered descriptor table and a scope constraint
//! list. Registration resolves every name once; everything downstream
//! holds `FieldDescriptor` values and never looks fields up by string
//! again except through [`FieldRegistry::lookup`].

use crate::error::RegistryError;
use crate::field::{FieldDescriptor, FieldKind};
use crate::literal::Literal;
use crate::record::RecordHandle;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A fixed equality constraint attached to a record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeConstraint {
    pub field: FieldDescriptor,
    pub value: Literal,
}

impl ScopeConstraint {
    pub fn new(field: FieldDescriptor, value: impl Into<Literal>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// One registered record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    name: String,
    fields: Vec<FieldDescriptor>,
    by_name: BTreeMap<String, usize>,
    scope: Vec<ScopeConstraint>,
}

impl RecordType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in registration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|index| &self.fields[*index])
    }

    pub fn scope(&self) -> &[ScopeConstraint] {
        &self.scope
    }

    /// A fresh, unkeyed record carrying this type's scope values.
    ///
    /// Scope on a collection field seeds a one-element collection.
    pub fn new_record(&self) -> RecordHandle {
        let mut record = RecordHandle::unkeyed();
        for constraint in &self.scope {
            let value = match constraint.field.kind {
                FieldKind::Collection => Literal::Collection(vec![constraint.value.clone()]),
                _ => constraint.value.clone(),
            };
            record.set_field(constraint.field.name.clone(), value);
        }
        record
    }
}

/// Registry of record types.
///
/// Built once at start-up and shared read-only (typically behind an `Arc`).
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    types: BTreeMap<String, RecordType>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type with its ordered fields and scope.
    ///
    /// Custom field ids are normalized to bare digits. Scope values are
    /// normalized the same way query operands are, so a text scope on a
    /// user field is stored as a user reference.
    pub fn register(
        &mut self,
        record_type: impl Into<String>,
        fields: Vec<FieldDescriptor>,
        scope: Vec<ScopeConstraint>,
    ) -> Result<(), RegistryError> {
        let record_type = record_type.into();
        if self.types.contains_key(&record_type) {
            return Err(RegistryError::DuplicateType(record_type));
        }

        let mut by_name = BTreeMap::new();
        let mut normalized = Vec::with_capacity(fields.len());
        for mut field in fields {
            if field.kind == FieldKind::Custom {
                field.remote_id = normalize_custom_id(&field)?;
            }
            if by_name.insert(field.name.clone(), normalized.len()).is_some() {
                return Err(RegistryError::DuplicateField {
                    record_type,
                    field: field.name,
                });
            }
            normalized.push(field);
        }

        let mut resolved_scope = Vec::with_capacity(scope.len());
        for constraint in scope {
            let declared = by_name
                .get(&constraint.field.name)
                .map(|index| &normalized[*index])
                .filter(|declared| {
                    declared.kind == constraint.field.kind
                        && (declared.remote_id == constraint.field.remote_id
                            || declared.kind == FieldKind::Custom)
                })
                .ok_or_else(|| RegistryError::ScopeFieldNotDeclared {
                    record_type: record_type.clone(),
                    field: constraint.field.name.clone(),
                })?;
            let value = declared.kind.coerce_operand(&constraint.value).ok_or_else(|| {
                RegistryError::ScopeKindMismatch {
                    record_type: record_type.clone(),
                    field: declared.name.clone(),
                    expected: declared.kind,
                    found: constraint.value.kind(),
                }
            })?;
            resolved_scope.push(ScopeConstraint {
                field: declared.clone(),
                value,
            });
        }

        self.types.insert(
            record_type.clone(),
            RecordType {
                name: record_type,
                fields: normalized,
                by_name,
                scope: resolved_scope,
            },
        );
        Ok(())
    }

    pub fn record_type(&self, record_type: &str) -> Result<&RecordType, RegistryError> {
        self.types
            .get(record_type)
            .ok_or_else(|| RegistryError::UnknownType(record_type.to_string()))
    }

    /// Resolve a declared field name on a record type.
    pub fn lookup(
        &self,
        record_type: &str,
        field: &str,
    ) -> Result<&FieldDescriptor, RegistryError> {
        self.record_type(record_type)?
            .field(field)
            .ok_or_else(|| RegistryError::UnknownField {
                record_type: record_type.to_string(),
                field: field.to_string(),
            })
    }

    pub fn scope_of(&self, record_type: &str) -> Result<&[ScopeConstraint], RegistryError> {
        Ok(self.record_type(record_type)?.scope())
    }

    pub fn new_record(&self, record_type: &str) -> Result<RecordHandle, RegistryError> {
        Ok(self.record_type(record_type)?.new_record())
    }

    /// Registered types in name order.
    pub fn types(&self) -> impl Iterator<Item = &RecordType> {
        self.types.values()
    }
}

fn custom_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:customfield_|cf\[)?(\d+)\]?$").expect("custom field id regex must compile")
    })
}

fn normalize_custom_id(field: &FieldDescriptor) -> Result<String, RegistryError> {
    custom_id_re()
        .captures(field.remote_id.trim())
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| RegistryError::InvalidCustomFieldId {
            field: field.name.clone(),
            remote_id: field.remote_id.clone(),
        })
}
