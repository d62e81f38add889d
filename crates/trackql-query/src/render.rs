//! Query renderer: `QueryRequest` → query text and request parameters.
//!
//! Pure formatting. A request that compiled always renders.

use crate::ast::{QueryNode, QueryRequest};
use serde::{Deserialize, Serialize};
use trackql_kernel::{Literal, truncate_to_minute};

/// Minute-precision date layout understood by the remote service.
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M";

const RESERVED_WORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "was", "empty", "null", "order", "by", "asc", "desc",
];

/// Search request body handed to the transport verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedQuery {
    pub jql: String,
    pub fields: Vec<String>,
    pub start_at: usize,
    pub max_results: usize,
}

pub fn render(request: &QueryRequest) -> RenderedQuery {
    let mut jql = request
        .predicate
        .as_ref()
        .map(render_predicate)
        .unwrap_or_default();

    if !request.order_by.is_empty() {
        let keys: Vec<String> = request
            .order_by
            .iter()
            .map(|key| format!("{} {}", key.field.query_identifier(), key.direction.as_str()))
            .collect();
        if !jql.is_empty() {
            jql.push(' ');
        }
        jql.push_str("ORDER BY ");
        jql.push_str(&keys.join(", "));
    }

    RenderedQuery {
        jql,
        fields: request
            .projection
            .iter()
            .map(|field| field.request_identifier())
            .collect(),
        start_at: request.start_at,
        max_results: request.max_results,
    }
}

/// Render one predicate as a self-contained query fragment.
pub fn render_predicate(node: &QueryNode) -> String {
    let mut out = String::new();
    write_node(&mut out, node);
    out
}

fn write_node(out: &mut String, node: &QueryNode) {
    match node {
        QueryNode::Comparison { field, op, value } => {
            out.push_str(&field.query_identifier());
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            out.push_str(&render_literal(value));
        }
        QueryNode::SetMembership { field, values } => {
            let rendered: Vec<String> = values.iter().map(render_literal).collect();
            out.push_str(&field.query_identifier());
            out.push_str(" in (");
            out.push_str(&rendered.join(", "));
            out.push(')');
        }
        QueryNode::TextContains { field, substring } => {
            out.push_str(&field.query_identifier());
            out.push_str(" ~ ");
            out.push_str(&render_text(substring));
        }
        QueryNode::LogicalAnd { left, right } => {
            write_node(out, left);
            out.push_str(" AND ");
            write_node(out, right);
        }
        QueryNode::Subquery { kind, inner } => {
            out.push_str("issueFunction in ");
            out.push_str(kind.function_name());
            out.push_str("(\"");
            out.push_str(&escape(&render_predicate(inner)));
            out.push_str("\")");
        }
    }
}

pub fn render_literal(value: &Literal) -> String {
    match value {
        Literal::Text(text) | Literal::UserRef(text) | Literal::RecordRef(text) => {
            render_text(text)
        }
        Literal::Integer(number) => number.to_string(),
        Literal::Date(date) => format!("\"{}\"", truncate_to_minute(*date).format(DATE_FORMAT)),
        Literal::Collection(items) => {
            let rendered: Vec<String> = items.iter().map(render_literal).collect();
            format!("({})", rendered.join(", "))
        }
    }
}

/// Plain words render bare; anything else is quoted.
fn render_text(text: &str) -> String {
    if is_bare_word(text) {
        text.to_string()
    } else {
        format!("\"{}\"", escape(text))
    }
}

fn is_bare_word(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '@' | '+' | '-'))
        && !RESERVED_WORDS
            .iter()
            .any(|word| word.eq_ignore_ascii_case(text))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
    out
}
