//! Typed predicate/projection builder supplied by calling code.
//!
//! `Expr` is intentionally wider than the query AST: it can spell OR,
//! negation, arithmetic, field-to-field comparison, and arbitrary function
//! calls, so callers get an explicit `UnsupportedExpression` from the
//! compiler instead of a builder that silently cannot say what they meant.
//!
//! ```
//! use trackql_query::expr::{Search, field};
//!
//! let search = Search::new()
//!     .filter(field("assignee").eq("dev1") & field("summary").contains("crash"))
//!     .page(0, 20);
//! ```

use crate::ast::{CompareOp, DEFAULT_MAX_RESULTS, SortDirection};
use std::ops::{BitAnd, BitOr, Not};
use trackql_kernel::Literal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Field(String),
    Literal(Literal),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    In {
        target: Box<Expr>,
        values: Vec<Expr>,
    },
    Contains {
        target: Box<Expr>,
        substring: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Records whose parent (of `record_type`) satisfies `inner`.
    ParentsOf {
        record_type: String,
        inner: Box<Expr>,
    },
    /// Records with at least one subtask (of `record_type`) satisfying `inner`.
    SubtasksOf {
        record_type: String,
        inner: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

/// Reference a declared field by name.
pub fn field(name: impl Into<String>) -> Expr {
    Expr::Field(name.into())
}

pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Literal(value.into())
}

pub fn parents_of(record_type: impl Into<String>, inner: Expr) -> Expr {
    Expr::ParentsOf {
        record_type: record_type.into(),
        inner: Box::new(inner),
    }
}

pub fn subtasks_of(record_type: impl Into<String>, inner: Expr) -> Expr {
    Expr::SubtasksOf {
        record_type: record_type.into(),
        inner: Box::new(inner),
    }
}

pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Call {
        function: function.into(),
        args,
    }
}

impl Expr {
    fn compare(self, op: CompareOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(rhs.into()),
        }
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Ne, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Ge, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Le, rhs)
    }

    pub fn is_in<I, T>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::In {
            target: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(self, substring: impl Into<Expr>) -> Expr {
        Expr::Contains {
            target: Box::new(self),
            substring: Box::new(substring.into()),
        }
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    pub fn negate(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn arith(self, op: ArithmeticOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Arithmetic {
            op,
            left: Box::new(self),
            right: Box::new(rhs.into()),
        }
    }

    /// Short human-readable name of this expression's outermost construct.
    pub fn construct(&self) -> String {
        match self {
            Expr::Field(name) => format!("field `{name}`"),
            Expr::Literal(value) => format!("{} literal", value.kind()),
            Expr::Compare { op, .. } => format!("comparison ({})", op.as_str()),
            Expr::In { .. } => "membership test".to_string(),
            Expr::Contains { .. } => "text search (~)".to_string(),
            Expr::And(..) => "logical AND".to_string(),
            Expr::Or(..) => "logical OR".to_string(),
            Expr::Not(..) => "negation".to_string(),
            Expr::Arithmetic { op, .. } => format!("arithmetic ({})", op.symbol()),
            Expr::ParentsOf { .. } => "parentsOf subquery".to_string(),
            Expr::SubtasksOf { .. } => "subtasksOf subquery".to_string(),
            Expr::Call { function, .. } => format!("function call `{function}`"),
        }
    }
}

impl From<Literal> for Expr {
    fn from(value: Literal) -> Self {
        Expr::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Literal(Literal::text(value))
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Literal(Literal::Text(value))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Expr {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Expr::Literal(Literal::Date(value))
    }
}

impl BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        self.and(rhs)
    }
}

impl BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Expr) -> Expr {
        self.or(rhs)
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        self.negate()
    }
}

/// Projection shape requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ProjectionExpr {
    /// Every field.
    #[default]
    All,
    /// One field.
    Field(String),
    /// A named or anonymous shape; each member must be a bare field.
    Shape {
        name: Option<String>,
        members: Vec<(String, Expr)>,
    },
    /// Any other projection expression; only a bare field translates.
    Computed(Expr),
}

impl ProjectionExpr {
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Shape {
            name: None,
            members: names
                .into_iter()
                .map(|name| {
                    let name = name.into();
                    (name.clone(), Expr::Field(name))
                })
                .collect(),
        }
    }
}

/// Source form of one search over a record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Search {
    pub predicate: Option<Expr>,
    pub projection: ProjectionExpr,
    pub order_by: Vec<(String, SortDirection)>,
    pub start_at: usize,
    pub max_results: usize,
}

impl Default for Search {
    fn default() -> Self {
        Self {
            predicate: None,
            projection: ProjectionExpr::All,
            order_by: Vec::new(),
            start_at: 0,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl Search {
    pub fn new() -> Self {
        Self::default()
    }

    /// AND `predicate` onto any predicate already set.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn select(mut self, projection: ProjectionExpr) -> Self {
        self.projection = projection;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    pub fn page(mut self, start_at: usize, max_results: usize) -> Self {
        self.start_at = start_at;
        self.max_results = max_results;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_build_the_expected_tree() {
        let expr = field("a").eq("x") & !field("b").eq("y") | field("c").gt(3_i64);
        match expr {
            Expr::Or(left, right) => {
                assert!(matches!(*left, Expr::And(..)));
                assert!(matches!(*right, Expr::Compare { op: CompareOp::Gt, .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn filter_accumulates_with_and() {
        let search = Search::new()
            .filter(field("a").eq("x"))
            .filter(field("b").eq("y"));
        assert!(matches!(search.predicate, Some(Expr::And(..))));
        assert_eq!(search.max_results, DEFAULT_MAX_RESULTS);
    }
}
