//! Query AST: the compiled, language-neutral form of one search.
//!
//! The predicate union is closed. There is deliberately no OR, NOT, or
//! nested field path variant; anything the compiler cannot express here it
//! rejects.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use trackql_kernel::{FieldDescriptor, Literal};

/// Page size used when a search does not set one.
pub const DEFAULT_MAX_RESULTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    pub fn is_ordered(self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }

    /// The operator with its operands swapped (`a < b` ⇔ `b > a`).
    pub fn flipped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
        }
    }

    /// Whether `actual.cmp(expected) == ordering` satisfies this operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubqueryKind {
    ParentsOf,
    SubtasksOf,
}

impl SubqueryKind {
    /// Function name used in query text.
    pub fn function_name(self) -> &'static str {
        match self {
            Self::ParentsOf => "parentsOf",
            Self::SubtasksOf => "subtasksOf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum QueryNode {
    Comparison {
        field: FieldDescriptor,
        op: CompareOp,
        value: Literal,
    },
    SetMembership {
        field: FieldDescriptor,
        values: Vec<Literal>,
    },
    TextContains {
        field: FieldDescriptor,
        substring: String,
    },
    LogicalAnd {
        left: Box<QueryNode>,
        right: Box<QueryNode>,
    },
    Subquery {
        kind: SubqueryKind,
        inner: Box<QueryNode>,
    },
}

impl QueryNode {
    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        Self::LogicalAnd {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Left-fold a sequence of nodes with `AND`; `None` when empty.
    pub fn conjoin(nodes: impl IntoIterator<Item = QueryNode>) -> Option<Self> {
        nodes.into_iter().reduce(Self::and)
    }

    /// Every field referenced by this node, including inside subqueries.
    pub fn fields(&self) -> Vec<&FieldDescriptor> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldDescriptor>) {
        match self {
            Self::Comparison { field, .. }
            | Self::SetMembership { field, .. }
            | Self::TextContains { field, .. } => out.push(field),
            Self::LogicalAnd { left, right } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Self::Subquery { inner, .. } => inner.collect_fields(out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: FieldDescriptor,
    pub direction: SortDirection,
}

/// One compiled search: predicate, projection, ordering, and page window.
///
/// An empty projection means "all fields".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryRequest {
    pub predicate: Option<QueryNode>,
    pub projection: Vec<FieldDescriptor>,
    pub order_by: Vec<OrderKey>,
    pub start_at: usize,
    pub max_results: usize,
}

impl QueryRequest {
    /// Match-everything request over the default page.
    pub fn all() -> Self {
        Self {
            predicate: None,
            projection: Vec::new(),
            order_by: Vec::new(),
            start_at: 0,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_page(mut self, start_at: usize, max_results: usize) -> Self {
        self.start_at = start_at;
        self.max_results = max_results;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackql_kernel::FieldKind;

    fn eq(name: &str, value: &str) -> QueryNode {
        QueryNode::Comparison {
            field: FieldDescriptor::builtin(name, FieldKind::Text),
            op: CompareOp::Eq,
            value: Literal::text(value),
        }
    }

    #[test]
    fn conjoin_left_folds() {
        let node = QueryNode::conjoin(vec![eq("a", "1"), eq("b", "2"), eq("c", "3")])
            .expect("non-empty");
        match &node {
            QueryNode::LogicalAnd { left, right } => {
                assert!(matches!(left.as_ref(), QueryNode::LogicalAnd { .. }));
                assert_eq!(right.as_ref(), &eq("c", "3"));
            }
            other => panic!("expected conjunction, got {other:?}"),
        }
        let names: Vec<&str> = node.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(QueryNode::conjoin(Vec::new()).is_none());
    }

    #[test]
    fn flipped_operator_preserves_meaning() {
        for op in [
            CompareOp::Eq,
            CompareOp::Ne,
            CompareOp::Gt,
            CompareOp::Ge,
            CompareOp::Lt,
            CompareOp::Le,
        ] {
            for ordering in [Ordering::Less, Ordering::Equal, Ordering::Greater] {
                assert_eq!(
                    op.accepts(ordering),
                    op.flipped().accepts(ordering.reverse()),
                    "{op:?} {ordering:?}"
                );
            }
        }
    }
}
