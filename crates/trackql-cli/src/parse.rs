//! Command-line clause syntax.
//!
//! Predicates: `field=value`, `field!=value`, `field>value`, `field>=value`,
//! `field<value`, `field<=value`, `field~text`, `field:in:a,b,c`.
//! Assignments: `field=value`; a collection field takes `a,b,c`.
//! Values are typed by the field's declared kind.

use crate::cli::QueryArgs;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use trackql_kernel::{FieldDescriptor, FieldKind, FieldRegistry, Literal};
use trackql_query::{Expr, ProjectionExpr, Search, SortDirection, field, lit};

const MEMBERSHIP_MARKER: &str = ":in:";

pub fn build_search(
    registry: &FieldRegistry,
    record_type: &str,
    args: &QueryArgs,
) -> Result<Search, String> {
    let mut search = Search::new().page(args.start_at, args.max_results);
    for raw in &args.predicates {
        search = search.filter(parse_predicate(registry, record_type, raw)?);
    }
    if !args.fields.is_empty() {
        search = search.select(ProjectionExpr::fields(args.fields.iter().cloned()));
    }
    for raw in &args.order {
        let (name, direction) = parse_order(raw)?;
        search = search.order_by(name, direction);
    }
    Ok(search)
}

pub fn parse_predicate(
    registry: &FieldRegistry,
    record_type: &str,
    raw: &str,
) -> Result<Expr, String> {
    if let Some((name, values)) = raw.split_once(MEMBERSHIP_MARKER) {
        let descriptor = lookup(registry, record_type, name)?;
        let values = values
            .split(',')
            .map(|value| parse_scalar(descriptor, value.trim()).map(lit))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(field(name.trim()).is_in(values));
    }

    let (name, op, value) = split_operator(raw)?;
    let descriptor = lookup(registry, record_type, name)?;
    let target = field(name);
    if op == "~" {
        return Ok(target.contains(value));
    }
    let value = parse_scalar(descriptor, value)?;
    Ok(match op {
        "=" => target.eq(value),
        "!=" => target.ne(value),
        ">" => target.gt(value),
        ">=" => target.ge(value),
        "<" => target.lt(value),
        "<=" => target.le(value),
        other => return Err(format!("unknown operator `{other}` in `{raw}`")),
    })
}

/// `field=value` for create/update.
pub fn parse_assignment(
    registry: &FieldRegistry,
    record_type: &str,
    raw: &str,
) -> Result<(String, Literal), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got `{raw}`"))?;
    let name = name.trim();
    let descriptor = lookup(registry, record_type, name)?;
    let value = match descriptor.kind {
        FieldKind::Collection => Literal::Collection(
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(Literal::text)
                .collect(),
        ),
        _ => parse_scalar(descriptor, value)?,
    };
    Ok((name.to_string(), value))
}

pub fn parse_order(raw: &str) -> Result<(String, SortDirection), String> {
    let (name, direction) = match raw.rsplit_once(':') {
        Some((name, direction)) => (name, direction),
        None => (raw, "asc"),
    };
    let direction = match direction.to_ascii_lowercase().as_str() {
        "asc" => SortDirection::Asc,
        "desc" => SortDirection::Desc,
        other => return Err(format!("unknown sort direction `{other}` in `{raw}`")),
    };
    Ok((name.trim().to_string(), direction))
}

fn lookup<'r>(
    registry: &'r FieldRegistry,
    record_type: &str,
    name: &str,
) -> Result<&'r FieldDescriptor, String> {
    registry
        .lookup(record_type, name.trim())
        .map_err(|e| e.to_string())
}

/// Split at the first operator character; two-character operators win.
fn split_operator(raw: &str) -> Result<(&str, &str, &str), String> {
    let start = raw
        .find(['=', '!', '>', '<', '~'])
        .ok_or_else(|| format!("no operator in `{raw}`"))?;
    let rest = &raw[start..];
    let width = if rest.starts_with("!=") || rest.starts_with(">=") || rest.starts_with("<=") {
        2
    } else {
        1
    };
    let name = raw[..start].trim();
    if name.is_empty() {
        return Err(format!("missing field name in `{raw}`"));
    }
    Ok((name, &rest[..width], rest[width..].trim()))
}

fn parse_scalar(descriptor: &FieldDescriptor, raw: &str) -> Result<Literal, String> {
    match descriptor.kind {
        FieldKind::Date => parse_date(raw)
            .map(Literal::Date)
            .ok_or_else(|| format!("field `{}` expects a date, got `{raw}`", descriptor.name)),
        FieldKind::Custom => Ok(raw
            .parse::<i64>()
            .map(Literal::Integer)
            .unwrap_or_else(|_| Literal::text(raw))),
        _ => Ok(Literal::text(raw)),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y/%m/%d %H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackql_query::{compile, render};

    fn registry() -> FieldRegistry {
        let mut registry = FieldRegistry::new();
        registry
            .register(
                "bug",
                vec![
                    FieldDescriptor::builtin("summary", FieldKind::Text),
                    FieldDescriptor::builtin("assignee", FieldKind::User),
                    FieldDescriptor::builtin("created", FieldKind::Date),
                    FieldDescriptor::builtin("labels", FieldKind::Collection),
                    FieldDescriptor::custom("story_points", 10016),
                ],
                vec![],
            )
            .expect("register bug");
        registry
    }

    fn rendered(clauses: &[&str]) -> String {
        let registry = registry();
        let args = QueryArgs {
            record_type: "bug".to_string(),
            predicates: clauses.iter().map(|c| c.to_string()).collect(),
            fields: Vec::new(),
            order: Vec::new(),
            start_at: 0,
            max_results: 50,
        };
        let search = build_search(&registry, "bug", &args).expect("clauses should parse");
        render(&compile(&registry, "bug", &search).expect("search should compile")).jql
    }

    #[test]
    fn clauses_render_through_the_compiler() {
        assert_eq!(rendered(&["assignee=dev1"]), "assignee = dev1");
        assert_eq!(
            rendered(&["story_points>=3", "summary~crash"]),
            "cf[10016] >= 3 AND summary ~ crash"
        );
        assert_eq!(rendered(&["labels:in:a,b"]), "labels in (a, b)");
        assert_eq!(
            rendered(&["created<2026-01-02"]),
            "created < \"2026/01/02 00:00\""
        );
        assert_eq!(rendered(&["summary != two words"]), "summary != \"two words\"");
    }

    #[test]
    fn malformed_clauses_are_reported() {
        let registry = registry();
        assert!(parse_predicate(&registry, "bug", "summary").is_err());
        assert!(parse_predicate(&registry, "bug", "=x").is_err());
        assert!(parse_predicate(&registry, "bug", "created=yesterday").is_err());
        assert!(parse_predicate(&registry, "bug", "reporter=x").is_err());
    }

    #[test]
    fn assignments_type_collection_and_custom_values() {
        let registry = registry();
        assert_eq!(
            parse_assignment(&registry, "bug", "labels=a, b").expect("assignment"),
            ("labels".to_string(), Literal::collection(["a", "b"]))
        );
        assert_eq!(
            parse_assignment(&registry, "bug", "story_points=5").expect("assignment"),
            ("story_points".to_string(), Literal::Integer(5))
        );
    }

    #[test]
    fn order_keys_default_to_ascending() {
        assert_eq!(
            parse_order("created").expect("order"),
            ("created".to_string(), SortDirection::Asc)
        );
        assert_eq!(
            parse_order("created:DESC").expect("order"),
            ("created".to_string(), SortDirection::Desc)
        );
        assert!(parse_order("created:sideways").is_err());
    }
}
