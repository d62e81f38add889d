//! # trackql-query
//!
//! Typed search expressions in, query text or matched records out.
//!
//! ```text
//! Expr / Search      ← caller-built predicate, projection, order, page
//!     │  compile (FieldRegistry, record type; scope AND-ed first)
//! QueryRequest       ← closed AST: comparison, membership, ~, AND, subquery
//!     ├─ render   → RenderedQuery (query text + remote field list)
//!     └─ evaluate → SearchResult over a RecordSnapshot
//! ```
//!
//! Compilation is pure and deterministic, so identical searches can share a
//! `CompileCache` entry.

pub mod ast;
pub mod compile;
pub mod eval;
pub mod expr;
pub mod render;

pub use ast::{
    CompareOp, DEFAULT_MAX_RESULTS, OrderKey, QueryNode, QueryRequest, SortDirection,
    SubqueryKind,
};
pub use compile::{CompileCache, CompileError, Compiler, compile};
pub use eval::{
    EvalError, SearchResult, count, count_cancellable, evaluate, evaluate_cancellable, exists,
    exists_cancellable, matches,
};
pub use expr::{ArithmeticOp, Expr, ProjectionExpr, Search, call, field, lit, parents_of, subtasks_of};
pub use render::{RenderedQuery, render, render_predicate};
