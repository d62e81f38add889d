//! Typed record construction: declared fields only, values coerced to
//! their field kind, and the record type's scope applied.

use crate::error::BackendError;
use trackql_kernel::{FieldDescriptor, FieldRegistry, Literal, RecordHandle, RecordPatch, RecordType};
use trackql_query::render::render_literal;

/// Build the record a `create` stores: scope values first, then the
/// caller's fields. A caller value contradicting the scope is rejected.
pub fn prepare_record(
    registry: &FieldRegistry,
    record_type: &str,
    record: RecordHandle,
) -> Result<RecordHandle, BackendError> {
    let declared = registry.record_type(record_type)?;
    let mut prepared = declared.new_record();
    prepared.id = record.id;
    prepared.key = record.key;
    prepared.parent_key = record.parent_key;

    for (name, value) in record.fields {
        let field = registry.lookup(record_type, &name)?;
        let value = coerce(field, &value)?;
        check_scope(declared, field, Some(&value))?;
        prepared.fields.insert(name, value);
    }
    Ok(prepared)
}

/// Validate a patch against the record type; returns it with coerced values.
pub fn prepare_patch(
    registry: &FieldRegistry,
    record_type: &str,
    patch: &RecordPatch,
) -> Result<RecordPatch, BackendError> {
    let declared = registry.record_type(record_type)?;
    let mut prepared = RecordPatch {
        parent_key: patch.parent_key.clone(),
        ..RecordPatch::default()
    };

    for name in &patch.unset {
        let field = registry.lookup(record_type, name)?;
        check_scope(declared, field, None)?;
        prepared.unset.insert(name.clone());
    }
    for (name, value) in &patch.set {
        let field = registry.lookup(record_type, name)?;
        let value = coerce(field, value)?;
        check_scope(declared, field, Some(&value))?;
        prepared.set.insert(name.clone(), value);
    }
    Ok(prepared)
}

fn coerce(field: &FieldDescriptor, value: &Literal) -> Result<Literal, BackendError> {
    field
        .kind
        .coerce_value(value)
        .ok_or_else(|| BackendError::KindMismatch {
            field: field.name.clone(),
            kind: field.kind,
            found: value.kind(),
        })
}

/// `value: None` means the field is being removed.
fn check_scope(
    declared: &RecordType,
    field: &FieldDescriptor,
    value: Option<&Literal>,
) -> Result<(), BackendError> {
    let Some(constraint) = declared
        .scope()
        .iter()
        .find(|constraint| constraint.field.name == field.name)
    else {
        return Ok(());
    };

    let satisfied = match value {
        Some(Literal::Collection(items)) => items.contains(&constraint.value),
        Some(value) => value == &constraint.value,
        None => false,
    };
    if satisfied {
        Ok(())
    } else {
        Err(BackendError::ScopeConflict {
            record_type: declared.name().to_string(),
            field: field.name.clone(),
            expected: render_literal(&constraint.value),
        })
    }
}
