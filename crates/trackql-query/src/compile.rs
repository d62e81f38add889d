//! Query compiler: `Search` expressions → `QueryRequest`.
//!
//! Compilation is the only validity gate. Every field is resolved through
//! the registry, the target type's scope is AND-ed in front of the caller's
//! predicate, and every construct outside the supported subset is rejected
//! by name. Nothing is ever dropped or approximated.

use crate::ast::{CompareOp, OrderKey, QueryNode, QueryRequest, SubqueryKind};
use crate::expr::{Expr, ProjectionExpr, Search};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use trackql_kernel::{
    FieldDescriptor, FieldKind, FieldRegistry, Literal, LiteralKind, RegistryError,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Unknown record type or field.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("unsupported expression: {construct}")]
    UnsupportedExpression { construct: String },

    #[error("cannot translate projection: {construct}")]
    ProjectionTranslation { construct: String },

    #[error("field `{field}` ({kind}) cannot be compared with a {found} literal")]
    KindMismatch {
        field: String,
        kind: FieldKind,
        found: LiteralKind,
    },
}

impl CompileError {
    fn unsupported(construct: impl Into<String>) -> Self {
        Self::UnsupportedExpression {
            construct: construct.into(),
        }
    }

    fn projection(construct: impl Into<String>) -> Self {
        Self::ProjectionTranslation {
            construct: construct.into(),
        }
    }

    pub fn is_unknown_field(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::UnknownField { .. }))
    }
}

/// Stateless compiler over a borrowed registry.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'r> {
    registry: &'r FieldRegistry,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r FieldRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r FieldRegistry {
        self.registry
    }

    /// Compile one search over `record_type`.
    pub fn compile(&self, record_type: &str, search: &Search) -> Result<QueryRequest, CompileError> {
        let predicate = search
            .predicate
            .as_ref()
            .map(|expr| self.lower(record_type, expr))
            .transpose()?;
        let predicate = self.scoped(record_type, predicate)?;
        let projection = self.projection(record_type, &search.projection)?;
        let order_by = self.order_by(record_type, &search.order_by)?;

        Ok(QueryRequest {
            predicate,
            projection,
            order_by,
            start_at: search.start_at,
            max_results: search.max_results,
        })
    }

    /// Lower a predicate without applying scope.
    pub fn compile_predicate(&self, record_type: &str, expr: &Expr) -> Result<QueryNode, CompileError> {
        self.lower(record_type, expr)
    }

    /// Scope constraints first (registration order), then `predicate`.
    fn scoped(
        &self,
        record_type: &str,
        predicate: Option<QueryNode>,
    ) -> Result<Option<QueryNode>, CompileError> {
        let scope = self.registry.scope_of(record_type)?;
        let nodes = scope
            .iter()
            .map(|constraint| QueryNode::Comparison {
                field: constraint.field.clone(),
                op: CompareOp::Eq,
                value: constraint.value.clone(),
            })
            .chain(predicate);
        Ok(QueryNode::conjoin(nodes))
    }

    fn lower(&self, record_type: &str, expr: &Expr) -> Result<QueryNode, CompileError> {
        match expr {
            Expr::Compare { op, left, right } => self.lower_compare(record_type, *op, left, right),
            Expr::In { target, values } => {
                let field = self.target_field(record_type, target, "membership test")?;
                if values.is_empty() {
                    return Err(CompileError::unsupported(format!(
                        "empty membership list on field `{}`",
                        field.name
                    )));
                }
                let values = values
                    .iter()
                    .map(|value| self.operand(&field, value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(QueryNode::SetMembership { field, values })
            }
            Expr::Contains { target, substring } => {
                let field = self.target_field(record_type, target, "text search (~)")?;
                if !matches!(field.kind, FieldKind::Text | FieldKind::Custom) {
                    return Err(CompileError::unsupported(format!(
                        "text search (~) on {} field `{}`",
                        field.kind, field.name
                    )));
                }
                let substring = match substring.as_ref() {
                    Expr::Literal(Literal::Text(text)) => text.clone(),
                    Expr::Literal(other) => {
                        return Err(CompileError::KindMismatch {
                            field: field.name.clone(),
                            kind: field.kind,
                            found: other.kind(),
                        });
                    }
                    other => {
                        return Err(CompileError::unsupported(format!(
                            "{} as text search operand",
                            other.construct()
                        )));
                    }
                };
                Ok(QueryNode::TextContains { field, substring })
            }
            Expr::And(left, right) => Ok(QueryNode::and(
                self.lower(record_type, left)?,
                self.lower(record_type, right)?,
            )),
            Expr::ParentsOf {
                record_type: inner_type,
                inner,
            } => self.lower_subquery(SubqueryKind::ParentsOf, inner_type, inner),
            Expr::SubtasksOf {
                record_type: inner_type,
                inner,
            } => self.lower_subquery(SubqueryKind::SubtasksOf, inner_type, inner),
            Expr::Field(name) => Err(CompileError::unsupported(format!(
                "bare field `{name}` used as a predicate"
            ))),
            Expr::Literal(value) => Err(CompileError::unsupported(format!(
                "bare {} literal used as a predicate",
                value.kind()
            ))),
            Expr::Or(..) | Expr::Not(..) | Expr::Arithmetic { .. } | Expr::Call { .. } => {
                Err(CompileError::unsupported(expr.construct()))
            }
        }
    }

    fn lower_compare(
        &self,
        record_type: &str,
        op: CompareOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<QueryNode, CompileError> {
        let (field_name, value, op) = match (left, right) {
            (Expr::Field(name), Expr::Literal(value)) => (name, value, op),
            (Expr::Literal(value), Expr::Field(name)) => (name, value, op.flipped()),
            (Expr::Field(_), Expr::Field(_)) => {
                return Err(CompileError::unsupported("field-to-field comparison"));
            }
            (Expr::Literal(_), Expr::Literal(_)) => {
                return Err(CompileError::unsupported("comparison between two literals"));
            }
            (Expr::Arithmetic { .. }, _) => return Err(CompileError::unsupported(left.construct())),
            (_, Expr::Arithmetic { .. }) => {
                return Err(CompileError::unsupported(right.construct()));
            }
            (Expr::Field(_) | Expr::Literal(_), other) | (other, _) => {
                return Err(CompileError::unsupported(format!(
                    "{} as comparison operand",
                    other.construct()
                )));
            }
        };

        let field = self.registry.lookup(record_type, field_name)?.clone();
        let value = self.coerce(&field, value)?;
        if op.is_ordered() && !(field.kind.supports_ordering() && value.is_ordered()) {
            return Err(CompileError::unsupported(format!(
                "ordered comparison ({}) on {} field `{}`",
                op.as_str(),
                field.kind,
                field.name
            )));
        }
        Ok(QueryNode::Comparison { field, op, value })
    }

    fn lower_subquery(
        &self,
        kind: SubqueryKind,
        inner_type: &str,
        inner: &Expr,
    ) -> Result<QueryNode, CompileError> {
        let inner = self.lower(inner_type, inner)?;
        let inner = self
            .scoped(inner_type, Some(inner))?
            .ok_or_else(|| CompileError::unsupported("empty subquery"))?;
        Ok(QueryNode::Subquery {
            kind,
            inner: Box::new(inner),
        })
    }

    fn target_field(
        &self,
        record_type: &str,
        target: &Expr,
        context: &str,
    ) -> Result<FieldDescriptor, CompileError> {
        match target {
            Expr::Field(name) => Ok(self.registry.lookup(record_type, name)?.clone()),
            other => Err(CompileError::unsupported(format!(
                "{context} over {}",
                other.construct()
            ))),
        }
    }

    fn operand(&self, field: &FieldDescriptor, expr: &Expr) -> Result<Literal, CompileError> {
        match expr {
            Expr::Literal(value) => self.coerce(field, value),
            Expr::Field(_) => Err(CompileError::unsupported("field-to-field comparison")),
            other => Err(CompileError::unsupported(format!(
                "{} as membership value",
                other.construct()
            ))),
        }
    }

    fn coerce(&self, field: &FieldDescriptor, value: &Literal) -> Result<Literal, CompileError> {
        if matches!(value, Literal::Collection(_)) {
            return Err(CompileError::unsupported(format!(
                "collection literal compared with field `{}`",
                field.name
            )));
        }
        field
            .kind
            .coerce_operand(value)
            .ok_or_else(|| CompileError::KindMismatch {
                field: field.name.clone(),
                kind: field.kind,
                found: value.kind(),
            })
    }

    fn projection(
        &self,
        record_type: &str,
        projection: &ProjectionExpr,
    ) -> Result<Vec<FieldDescriptor>, CompileError> {
        let names: Vec<&str> = match projection {
            ProjectionExpr::All => return Ok(Vec::new()),
            ProjectionExpr::Field(name) => vec![name.as_str()],
            ProjectionExpr::Computed(Expr::Field(name)) => vec![name.as_str()],
            ProjectionExpr::Computed(other) => {
                return Err(CompileError::projection(other.construct()));
            }
            ProjectionExpr::Shape { name, members } => {
                if members.is_empty() {
                    let label = name.as_deref().unwrap_or("anonymous");
                    return Err(CompileError::projection(format!("empty {label} shape")));
                }
                members
                    .iter()
                    .map(|(alias, member)| match member {
                        Expr::Field(field) => Ok(field.as_str()),
                        other => Err(CompileError::projection(format!(
                            "member `{alias}` is a {}",
                            other.construct()
                        ))),
                    })
                    .collect::<Result<_, _>>()?
            }
        };

        let mut seen = BTreeSet::new();
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            if seen.insert(name) {
                fields.push(self.registry.lookup(record_type, name)?.clone());
            }
        }
        Ok(fields)
    }

    fn order_by(
        &self,
        record_type: &str,
        keys: &[(String, crate::ast::SortDirection)],
    ) -> Result<Vec<OrderKey>, CompileError> {
        keys.iter()
            .map(|(name, direction)| {
                let field = self.registry.lookup(record_type, name)?.clone();
                if field.kind == FieldKind::Collection {
                    return Err(CompileError::unsupported(format!(
                        "ordering by collection field `{}`",
                        field.name
                    )));
                }
                Ok(OrderKey {
                    field,
                    direction: *direction,
                })
            })
            .collect()
    }
}

/// Compile one search against `registry`.
pub fn compile(
    registry: &FieldRegistry,
    record_type: &str,
    search: &Search,
) -> Result<QueryRequest, CompileError> {
    Compiler::new(registry).compile(record_type, search)
}

/// Memoized compilation keyed by record type and source expression.
///
/// Compilation is pure, so a hit is indistinguishable from a recompile.
#[derive(Debug, Default)]
pub struct CompileCache {
    entries: RwLock<HashMap<(String, Search), Arc<QueryRequest>>>,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        compiler: &Compiler<'_>,
        record_type: &str,
        search: &Search,
    ) -> Result<Arc<QueryRequest>, CompileError> {
        let cache_key = (record_type.to_string(), search.clone());
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cache_key)
        {
            tracing::trace!(record_type, "compile cache hit");
            return Ok(Arc::clone(hit));
        }

        let compiled = Arc::new(compiler.compile(record_type, search)?);
        tracing::trace!(record_type, "compile cache miss");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(cache_key)
            .or_insert_with(|| Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
