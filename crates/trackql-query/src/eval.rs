//! Query evaluator: executes a `QueryRequest` against a record snapshot.
//!
//! Semantics mirror the remote service for the supported subset:
//! - absent fields never match (including under `!=`)
//! - dates compare at minute precision, the precision query text carries
//! - `=`/`!=`/`in` on collection values test element membership
//! - `~` is a case-sensitive substring test
//!
//! Subquery nodes consult the snapshot's key and child indexes and memoise
//! the inner result per related record, so each record's inner predicate is
//! evaluated at most once per subquery node: O(n) per node, never a nested
//! scan.

use crate::ast::{CompareOp, OrderKey, QueryNode, QueryRequest, SortDirection, SubqueryKind};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::ControlFlow;
use tokio_util::sync::CancellationToken;
use trackql_kernel::{FieldDescriptor, Literal, RecordHandle, RecordSnapshot, truncate_to_minute};

/// Matched page plus the full match count; identical shape for every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub matched: Vec<RecordHandle>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("evaluation cancelled")]
    Cancelled,
}

/// Evaluate with filtering, ordering, pagination, and projection.
pub fn evaluate(request: &QueryRequest, snapshot: &RecordSnapshot) -> SearchResult {
    evaluate_inner(request, snapshot, None).unwrap_or_else(|_| SearchResult {
        matched: Vec::new(),
        total: 0,
    })
}

pub fn evaluate_cancellable(
    request: &QueryRequest,
    snapshot: &RecordSnapshot,
    cancel: &CancellationToken,
) -> Result<SearchResult, EvalError> {
    evaluate_inner(request, snapshot, Some(cancel))
}

/// Count matches without materializing them.
pub fn count(request: &QueryRequest, snapshot: &RecordSnapshot) -> usize {
    count_inner(request, snapshot, None).unwrap_or_default()
}

pub fn count_cancellable(
    request: &QueryRequest,
    snapshot: &RecordSnapshot,
    cancel: &CancellationToken,
) -> Result<usize, EvalError> {
    count_inner(request, snapshot, Some(cancel))
}

/// Whether any record matches; stops at the first match.
pub fn exists(request: &QueryRequest, snapshot: &RecordSnapshot) -> bool {
    exists_inner(request, snapshot, None).unwrap_or_default()
}

pub fn exists_cancellable(
    request: &QueryRequest,
    snapshot: &RecordSnapshot,
    cancel: &CancellationToken,
) -> Result<bool, EvalError> {
    exists_inner(request, snapshot, Some(cancel))
}

/// Test one record against a predicate.
pub fn matches(node: &QueryNode, record: &RecordHandle, snapshot: &RecordSnapshot) -> bool {
    Plan::prepare(node).test(record, snapshot)
}

fn evaluate_inner(
    request: &QueryRequest,
    snapshot: &RecordSnapshot,
    cancel: Option<&CancellationToken>,
) -> Result<SearchResult, EvalError> {
    let plan = request.predicate.as_ref().map(Plan::prepare);

    if request.order_by.is_empty() {
        let end = request.start_at.saturating_add(request.max_results);
        let mut total = 0usize;
        let mut page = Vec::new();
        scan(plan.as_ref(), snapshot, cancel, |record| {
            if total >= request.start_at && total < end {
                page.push(record);
            }
            total += 1;
            ControlFlow::Continue(())
        })?;
        return Ok(finish(request, page, total));
    }

    let mut hits = Vec::new();
    scan(plan.as_ref(), snapshot, cancel, |record| {
        hits.push(record);
        ControlFlow::Continue(())
    })?;
    hits.sort_by(|a, b| order_records(&request.order_by, a, b));

    let total = hits.len();
    let page: Vec<&RecordHandle> = hits
        .into_iter()
        .skip(request.start_at)
        .take(request.max_results)
        .collect();
    Ok(finish(request, page, total))
}

fn finish(request: &QueryRequest, page: Vec<&RecordHandle>, total: usize) -> SearchResult {
    let matched = page
        .into_iter()
        .map(|record| {
            if request.projection.is_empty() {
                record.clone()
            } else {
                record.project(request.projection.iter().map(|field| field.name.as_str()))
            }
        })
        .collect();
    SearchResult { matched, total }
}

fn count_inner(
    request: &QueryRequest,
    snapshot: &RecordSnapshot,
    cancel: Option<&CancellationToken>,
) -> Result<usize, EvalError> {
    let plan = request.predicate.as_ref().map(Plan::prepare);
    let mut total = 0usize;
    scan(plan.as_ref(), snapshot, cancel, |_| {
        total += 1;
        ControlFlow::Continue(())
    })?;
    Ok(total)
}

fn exists_inner(
    request: &QueryRequest,
    snapshot: &RecordSnapshot,
    cancel: Option<&CancellationToken>,
) -> Result<bool, EvalError> {
    let plan = request.predicate.as_ref().map(Plan::prepare);
    let mut found = false;
    scan(plan.as_ref(), snapshot, cancel, |_| {
        found = true;
        ControlFlow::Break(())
    })?;
    Ok(found)
}

/// Visit matching records in snapshot order until `visit` breaks.
fn scan<'s>(
    plan: Option<&Plan<'_>>,
    snapshot: &'s RecordSnapshot,
    cancel: Option<&CancellationToken>,
    mut visit: impl FnMut(&'s RecordHandle) -> ControlFlow<()>,
) -> Result<(), EvalError> {
    for record in snapshot.records() {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(EvalError::Cancelled);
        }
        let hit = plan.is_none_or(|plan| plan.test(record, snapshot));
        if hit && visit(record).is_break() {
            break;
        }
    }
    Ok(())
}

/// Evaluation-time mirror of `QueryNode` carrying subquery memo tables.
enum Plan<'q> {
    Comparison {
        field: &'q FieldDescriptor,
        op: CompareOp,
        value: &'q Literal,
    },
    SetMembership {
        field: &'q FieldDescriptor,
        values: &'q [Literal],
    },
    TextContains {
        field: &'q FieldDescriptor,
        substring: &'q str,
    },
    And(Box<Plan<'q>>, Box<Plan<'q>>),
    Subquery {
        kind: SubqueryKind,
        inner: Box<Plan<'q>>,
        memo: RefCell<HashMap<String, bool>>,
    },
}

impl<'q> Plan<'q> {
    fn prepare(node: &'q QueryNode) -> Self {
        match node {
            QueryNode::Comparison { field, op, value } => Self::Comparison {
                field,
                op: *op,
                value,
            },
            QueryNode::SetMembership { field, values } => Self::SetMembership { field, values },
            QueryNode::TextContains { field, substring } => Self::TextContains { field, substring },
            QueryNode::LogicalAnd { left, right } => Self::And(
                Box::new(Self::prepare(left)),
                Box::new(Self::prepare(right)),
            ),
            QueryNode::Subquery { kind, inner } => Self::Subquery {
                kind: *kind,
                inner: Box::new(Self::prepare(inner)),
                memo: RefCell::new(HashMap::new()),
            },
        }
    }

    fn test(&self, record: &RecordHandle, snapshot: &RecordSnapshot) -> bool {
        match self {
            Self::Comparison { field, op, value } => {
                compare(record.field(&field.name), *op, value)
            }
            Self::SetMembership { field, values } => record
                .field(&field.name)
                .is_some_and(|actual| values.iter().any(|value| holds(actual, value))),
            Self::TextContains { field, substring } => record
                .field(&field.name)
                .is_some_and(|actual| contains_text(actual, substring)),
            Self::And(left, right) => {
                left.test(record, snapshot) && right.test(record, snapshot)
            }
            Self::Subquery { kind, inner, memo } => match kind {
                SubqueryKind::ParentsOf => snapshot
                    .parent_of(record)
                    .is_some_and(|parent| memoized(memo, inner, parent, snapshot)),
                SubqueryKind::SubtasksOf => snapshot
                    .children_of(&record.key)
                    .any(|child| memoized(memo, inner, child, snapshot)),
            },
        }
    }
}

fn memoized(
    memo: &RefCell<HashMap<String, bool>>,
    inner: &Plan<'_>,
    related: &RecordHandle,
    snapshot: &RecordSnapshot,
) -> bool {
    if let Some(hit) = memo.borrow().get(&related.key) {
        return *hit;
    }
    let result = inner.test(related, snapshot);
    memo.borrow_mut().insert(related.key.clone(), result);
    result
}

fn compare(actual: Option<&Literal>, op: CompareOp, expected: &Literal) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match (actual, op) {
        (Literal::Collection(_), CompareOp::Eq) => holds(actual, expected),
        (Literal::Collection(_), CompareOp::Ne) => !holds(actual, expected),
        (_, CompareOp::Eq) => literal_eq(actual, expected),
        (_, CompareOp::Ne) => !literal_eq(actual, expected),
        _ => literal_cmp(actual, expected).is_some_and(|ordering| op.accepts(ordering)),
    }
}

/// Equality, element-wise when `actual` is a collection.
fn holds(actual: &Literal, expected: &Literal) -> bool {
    match actual {
        Literal::Collection(items) => items.iter().any(|item| literal_eq(item, expected)),
        _ => literal_eq(actual, expected),
    }
}

fn literal_eq(actual: &Literal, expected: &Literal) -> bool {
    match (actual, expected) {
        (Literal::Date(a), Literal::Date(b)) => truncate_to_minute(*a) == truncate_to_minute(*b),
        (Literal::Integer(a), Literal::Integer(b)) => a == b,
        _ => match (actual.as_text(), expected.as_text()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn literal_cmp(actual: &Literal, expected: &Literal) -> Option<Ordering> {
    match (actual, expected) {
        (Literal::Date(a), Literal::Date(b)) => {
            Some(truncate_to_minute(*a).cmp(&truncate_to_minute(*b)))
        }
        (Literal::Integer(a), Literal::Integer(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains_text(actual: &Literal, substring: &str) -> bool {
    match actual {
        Literal::Collection(items) => items.iter().any(|item| contains_text(item, substring)),
        _ => actual
            .as_text()
            .is_some_and(|text| text.contains(substring)),
    }
}

fn order_records(keys: &[OrderKey], a: &RecordHandle, b: &RecordHandle) -> Ordering {
    for key in keys {
        let ordering = order_values(a.field(&key.field.name), b.field(&key.field.name));
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Absent values sort after present ones (so first under `DESC`). Dates
/// order at minute precision, the same precision `=` uses, so same-minute
/// records tie and keep id order.
fn order_values(a: Option<&Literal>, b: Option<&Literal>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Literal::Date(x), Literal::Date(y)) => {
                truncate_to_minute(*x).cmp(&truncate_to_minute(*y))
            }
            (Literal::Integer(x), Literal::Integer(y)) => x.cmp(y),
            _ => match (a.as_text(), b.as_text()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => kind_rank(a).cmp(&kind_rank(b)),
            },
        },
    }
}

fn kind_rank(value: &Literal) -> u8 {
    match value {
        Literal::Integer(_) => 0,
        Literal::Date(_) => 1,
        Literal::Text(_) | Literal::UserRef(_) | Literal::RecordRef(_) => 2,
        Literal::Collection(_) => 3,
    }
}
