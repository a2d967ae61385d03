//! The query AST itself (`spec.md` §3 "AST") and its completion.

use serde::{Deserialize, Serialize};
use zero_core::errors::{ZeroError, ZeroResult};
use zero_core::{Schema, Value};

use crate::expr::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// A keyset-pagination cursor: skip rows strictly preceding (or, if
/// `inclusive`, including) this row prefix (`spec.md` §4.2.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Start {
    pub row: Vec<Value>,
    pub inclusive: bool,
}

/// A nested relationship subtree, attached to the parent's `add`/`remove` as
/// a named child (`spec.md` §3 "RELATED list").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Related {
    pub name: String,
    pub child: Box<Ast>,
    /// Whether this hop is the hidden junction half of a two-hop
    /// relationship; hidden hops are never exposed to the view tree
    /// (`spec.md` §4.2.3).
    pub hidden_junction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    pub table: String,
    pub alias: Option<String>,
    pub where_: Option<Expr>,
    pub order_by: Vec<(String, OrderDirection)>,
    pub limit: Option<u64>,
    pub start: Option<Start>,
    pub related: Vec<Related>,
}

impl Ast {
    pub fn new(table: impl Into<String>) -> Self {
        Ast {
            table: table.into(),
            alias: None,
            where_: None,
            order_by: Vec::new(),
            limit: None,
            start: None,
            related: Vec::new(),
        }
    }

    pub fn with_where(mut self, e: Expr) -> Self {
        self.where_ = Some(e);
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<(String, OrderDirection)>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_related(mut self, related: Related) -> Self {
        self.related.push(related);
        self
    }
}

/// A [`Ast`] that has passed completion: ORDER BY has had the table's primary
/// key appended, and the junction/NOT-EXISTS validations of `spec.md` §4.3
/// have been checked, recursively, for every `RELATED` subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedAst(pub(crate) Ast);

impl CompletedAst {
    pub fn ast(&self) -> &Ast {
        &self.0
    }

    pub fn into_ast(self) -> Ast {
        self.0
    }
}

/// Completes `ast` against `schema`: appends primary-key columns not already
/// present in ORDER BY (ascending, `spec.md` §3 invariant (i)), and validates
/// invariants (ii) and (iii) — LIMIT/explicit ORDER BY rejected inside hidden
/// junction subqueries, NOT EXISTS rejected everywhere.
pub fn complete(ast: Ast, schema: &Schema) -> ZeroResult<CompletedAst> {
    let completed = complete_inner(ast, schema, false)?;
    Ok(CompletedAst(completed))
}

fn complete_inner(mut ast: Ast, schema: &Schema, inside_junction: bool) -> ZeroResult<Ast> {
    if inside_junction && (ast.limit.is_some() || !ast.order_by.is_empty()) {
        return Err(ZeroError::unsupported(
            "LIMIT and explicit ORDER BY are rejected inside a junction subquery",
        ));
    }
    if let Some(where_) = &ast.where_ {
        reject_not_exists(where_)?;
    }

    let table = schema.table(&ast.table)?;
    for pk_col in &table.primary_key {
        if !ast.order_by.iter().any(|(c, _)| c == pk_col) {
            ast.order_by
                .push((pk_col.clone(), OrderDirection::Asc));
        }
    }

    let mut completed_related = Vec::with_capacity(ast.related.len());
    for r in ast.related.into_iter() {
        let child = complete_inner(*r.child, schema, r.hidden_junction)?;
        completed_related.push(Related {
            name: r.name,
            child: Box::new(child),
            hidden_junction: r.hidden_junction,
        });
    }
    ast.related = completed_related;

    Ok(ast)
}

/// `spec.md` §4.3: "rejects NOT EXISTS at the client level". After
/// [`crate::simplify::simplify`] has pushed negations down, a direct
/// `Not(Exists(..))` is the only remaining representation of NOT EXISTS, so
/// it's sufficient to walk for that shape.
fn reject_not_exists(e: &Expr) -> ZeroResult<()> {
    match e {
        Expr::Not(inner) => {
            if matches!(inner.as_ref(), Expr::Exists(_)) {
                return Err(ZeroError::unsupported(
                    "NOT EXISTS is not representable on client-side ASTs",
                ));
            }
            reject_not_exists(inner)
        }
        Expr::And(parts) | Expr::Or(parts) => {
            for p in parts {
                reject_not_exists(p)?;
            }
            Ok(())
        }
        Expr::Exists(ex) => {
            if let Some(w) = &ex.where_ {
                reject_not_exists(w)?;
            }
            Ok(())
        }
        Expr::Compare { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::{Cardinality, ColumnKind, ColumnSpec, TableSpec};

    fn schema() -> Schema {
        let mut s = Schema::default();
        s.tables.insert(
            "item".into(),
            TableSpec {
                name: "item".into(),
                columns: vec![
                    ColumnSpec { name: "id".into(), kind: ColumnKind::String },
                    ColumnSpec { name: "price".into(), kind: ColumnKind::Int64 },
                    ColumnSpec { name: "_0_version".into(), kind: ColumnKind::String },
                ],
                primary_key: vec!["id".into()],
                unique_keys: vec![],
                zero_version_column: "_0_version".into(),
            },
        );
        let _ = Cardinality::One;
        s
    }

    #[test]
    fn completion_appends_primary_key_ascending() {
        let ast = Ast::new("item");
        let completed = complete(ast, &schema()).unwrap();
        assert_eq!(
            completed.ast().order_by,
            vec![("id".to_string(), OrderDirection::Asc)]
        );
    }

    #[test]
    fn completion_does_not_duplicate_explicit_pk_order() {
        let ast = Ast::new("item")
            .with_order_by(vec![("id".to_string(), OrderDirection::Desc)]);
        let completed = complete(ast, &schema()).unwrap();
        assert_eq!(
            completed.ast().order_by,
            vec![("id".to_string(), OrderDirection::Desc)]
        );
    }

    #[test]
    fn limit_inside_junction_is_rejected() {
        let child = Ast::new("item").with_limit(1);
        let ast = Ast::new("item").with_related(Related {
            name: "labels".into(),
            child: Box::new(child),
            hidden_junction: true,
        });
        assert!(complete(ast, &schema()).is_err());
    }

    #[test]
    fn not_exists_is_rejected() {
        use crate::expr::ExistsExpr;
        let ast = Ast::new("item").with_where(Expr::not(Expr::Exists(ExistsExpr {
            relationship: "owner".into(),
            where_: None,
            flip: false,
        })));
        assert!(complete(ast, &schema()).is_err());
    }
}
