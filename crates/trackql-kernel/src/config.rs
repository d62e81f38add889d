//! `trackql.toml`: record type declarations and store settings.
//!
//! ```toml
//! [store]
//! root = ".trackql"
//! default_prefix = "REC"
//!
//! [[types]]
//! name = "bug"
//! fields = [
//!   { name = "project", kind = "text" },
//!   { name = "story_points", remote = "10016", kind = "custom" },
//! ]
//! scope = [{ field = "project", text = "DEV" }]
//! ```

use crate::error::ConfigError;
use crate::field::{FieldDescriptor, FieldKind};
use crate::literal::Literal;
use crate::registry::{FieldRegistry, ScopeConstraint};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "trackql.toml";
pub const DEFAULT_STORE_ROOT: &str = ".trackql";
pub const DEFAULT_KEY_PREFIX: &str = "REC";
pub const DEFAULT_LOCK_RETRIES: u32 = 8;
pub const DEFAULT_LOCK_BACKOFF_MS: u64 = 5;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackqlConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub types: Vec<TypeConfig>,
}

/// Filesystem store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_prefix")]
    pub default_prefix: String,
    /// Lock attempts after the first before giving up.
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    /// Initial backoff between lock attempts; doubles per retry.
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            default_prefix: default_prefix(),
            lock_retries: DEFAULT_LOCK_RETRIES,
            lock_backoff_ms: DEFAULT_LOCK_BACKOFF_MS,
        }
    }
}

impl StoreSettings {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_ROOT)
}

fn default_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_lock_retries() -> u32 {
    DEFAULT_LOCK_RETRIES
}

fn default_lock_backoff_ms() -> u64 {
    DEFAULT_LOCK_BACKOFF_MS
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeConfig {
    pub name: String,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub scope: Vec<ScopeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub name: String,
    /// Remote identifier; defaults to `name` for built-in fields.
    #[serde(default)]
    pub remote: Option<String>,
    pub kind: FieldKind,
}

/// One scope constraint; exactly one typed value key must be present.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    pub field: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub integer: Option<i64>,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub record: Option<String>,
}

impl TrackqlConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Build the field registry declared by `[[types]]`.
    pub fn build_registry(&self) -> Result<FieldRegistry, ConfigError> {
        let mut registry = FieldRegistry::new();
        for type_config in &self.types {
            let fields: Vec<FieldDescriptor> = type_config
                .fields
                .iter()
                .map(|field| {
                    FieldDescriptor::new(
                        field.name.clone(),
                        field.remote.clone().unwrap_or_else(|| field.name.clone()),
                        field.kind,
                    )
                })
                .collect();

            let mut scope = Vec::with_capacity(type_config.scope.len());
            for constraint in &type_config.scope {
                let field = fields
                    .iter()
                    .find(|field| field.name == constraint.field)
                    .cloned()
                    .ok_or_else(|| ConfigError::ScopeValue {
                        record_type: type_config.name.clone(),
                        field: constraint.field.clone(),
                        message: "field is not declared on this type".to_string(),
                    })?;
                let value = constraint.literal().map_err(|message| ConfigError::ScopeValue {
                    record_type: type_config.name.clone(),
                    field: constraint.field.clone(),
                    message,
                })?;
                scope.push(ScopeConstraint::new(field, value));
            }

            registry.register(type_config.name.clone(), fields, scope)?;
        }
        Ok(registry)
    }
}

impl ScopeConfig {
    fn literal(&self) -> Result<Literal, String> {
        let mut values = Vec::new();
        if let Some(text) = &self.text {
            values.push(Literal::text(text.clone()));
        }
        if let Some(integer) = self.integer {
            values.push(Literal::Integer(integer));
        }
        if let Some(date) = &self.date {
            let parsed = DateTime::parse_from_rfc3339(date)
                .map_err(|e| format!("invalid date `{date}`: {e}"))?;
            values.push(Literal::Date(parsed.with_timezone(&Utc)));
        }
        if let Some(user) = &self.user {
            values.push(Literal::user(user.clone()));
        }
        if let Some(record) = &self.record {
            values.push(Literal::record(record.clone()));
        }

        match values.len() {
            1 => Ok(values.remove(0)),
            0 => Err("expected one of text, integer, date, user, record".to_string()),
            _ => Err("expected exactly one typed value".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_settings_default_when_section_missing() {
        let config = TrackqlConfig::from_toml_str("").expect("empty config parses");
        assert_eq!(config.store.root, PathBuf::from(DEFAULT_STORE_ROOT));
        assert_eq!(config.store.lock_retries, DEFAULT_LOCK_RETRIES);
        assert!(config.types.is_empty());
    }

    #[test]
    fn scope_requires_exactly_one_value() {
        let raw = r#"
            [[types]]
            name = "bug"
            fields = [{ name = "project", kind = "text" }]
            scope = [{ field = "project", text = "DEV", integer = 3 }]
        "#;
        let config = TrackqlConfig::from_toml_str(raw).expect("parses");
        let err = config.build_registry().expect_err("two values");
        assert!(err.to_string().contains("exactly one"), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let raw = r#"
            [store]
            rooot = "x"
        "#;
        assert!(matches!(
            TrackqlConfig::from_toml_str(raw),
            Err(ConfigError::Parse(_))
        ));
    }
}
