//! Typed literal values carried by records and query predicates.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed value stored on a record or compared against in a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Text(String),
    Integer(i64),
    Date(DateTime<Utc>),
    UserRef(String),
    RecordRef(String),
    Collection(Vec<Literal>),
}

/// Discriminant of a [`Literal`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    Text,
    Integer,
    Date,
    UserRef,
    RecordRef,
    Collection,
}

impl LiteralKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Date => "date",
            Self::UserRef => "user",
            Self::RecordRef => "record",
            Self::Collection => "collection",
        }
    }
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Literal {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn user(value: impl Into<String>) -> Self {
        Self::UserRef(value.into())
    }

    pub fn record(key: impl Into<String>) -> Self {
        Self::RecordRef(key.into())
    }

    pub fn collection<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Literal>,
    {
        Self::Collection(items.into_iter().map(Into::into).collect())
    }

    pub fn kind(&self) -> LiteralKind {
        match self {
            Self::Text(_) => LiteralKind::Text,
            Self::Integer(_) => LiteralKind::Integer,
            Self::Date(_) => LiteralKind::Date,
            Self::UserRef(_) => LiteralKind::UserRef,
            Self::RecordRef(_) => LiteralKind::RecordRef,
            Self::Collection(_) => LiteralKind::Collection,
        }
    }

    /// String payload of text-like literals (text, user, record reference).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) | Self::UserRef(value) | Self::RecordRef(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn elements(&self) -> Option<&[Literal]> {
        match self {
            Self::Collection(items) => Some(items),
            _ => None,
        }
    }

    /// Whether the literal orders meaningfully against another of its kind.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Date(_))
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

/// Drop seconds and sub-second precision.
///
/// Query text carries dates at minute precision, so evaluation compares at
/// the same granularity.
pub fn truncate_to_minute(value: DateTime<Utc>) -> DateTime<Utc> {
    value
        .with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn truncate_to_minute_drops_seconds_and_nanos() {
        let value = Utc
            .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .single()
            .expect("fixed time")
            + chrono::Duration::milliseconds(589);
        let truncated = truncate_to_minute(value);
        assert_eq!(
            truncated,
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 0)
                .single()
                .expect("fixed time")
        );
    }

    #[test]
    fn text_like_literals_share_payload_access() {
        assert_eq!(Literal::text("a").as_text(), Some("a"));
        assert_eq!(Literal::user("dev1").as_text(), Some("dev1"));
        assert_eq!(Literal::record("DEV-1").as_text(), Some("DEV-1"));
        assert_eq!(Literal::Integer(3).as_text(), None);
    }

    #[test]
    fn literal_serializes_with_kind_tag() {
        let value = serde_json::to_value(Literal::user("dev1")).expect("serialize");
        assert_eq!(value, serde_json::json!({"kind": "user_ref", "value": "dev1"}));
    }
}
