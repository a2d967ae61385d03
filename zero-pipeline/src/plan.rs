//! The `Plan` intermediate tree (`spec.md` §4.3 "C3"): a typed staging step
//! between a [`zero_ast::CompletedAst`] and a wired [`crate::pipeline::Pipeline`],
//! mirroring the teacher's AST → MIR → dataflow staging. Junction LIMIT/ORDER
//! BY and NOT-EXISTS rejection already happened during
//! [`zero_ast::complete`]; this stage resolves every RELATED/EXISTS
//! relationship name against the schema up front (so the builder never has
//! to fail mid-wire) and rejects a RELATED list that names the same
//! relationship twice under one parent.

use std::collections::HashSet;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;

use zero_ast::{Ast, CompletedAst, Expr, ExistsExpr, Related};
use zero_core::errors::ZeroResult;
use zero_core::{invariant, Relationship, Schema};

/// A RELATED child, already resolved against the schema's relationship
/// metadata (including, for a two-hop relationship, its junction spec).
#[derive(Debug, Clone)]
pub struct PlanRelated {
    pub name: String,
    pub relationship: Relationship,
    pub child: Box<PlanNode>,
}

/// An EXISTS subquery within a WHERE tree, resolved the same way.
#[derive(Debug, Clone)]
pub struct PlanExists {
    pub relationship: Relationship,
    pub flip: bool,
    pub where_: Option<Box<PlanExpr>>,
}

/// The WHERE tree, with `Exists` nodes resolved to [`PlanExists`].
#[derive(Debug, Clone)]
pub enum PlanExpr {
    And(Vec<PlanExpr>),
    Or(Vec<PlanExpr>),
    Not(Box<PlanExpr>),
    Compare(zero_ast::Expr),
    Exists(PlanExists),
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub table: String,
    pub where_: Option<PlanExpr>,
    pub order_by: Vec<(String, zero_ast::OrderDirection)>,
    pub limit: Option<u64>,
    pub start: Option<zero_ast::Start>,
    pub related: Vec<PlanRelated>,
}

/// Resolves `ast` against `schema` into a [`PlanNode`], rejecting any RELATED
/// list that names the same relationship twice under one parent.
pub fn build_plan(ast: &CompletedAst, schema: &Schema) -> ZeroResult<PlanNode> {
    let plan = plan_node(ast.ast(), schema)?;
    // The RELATED/EXISTS traversal is compiled straight from a finite AST
    // tree, so it is acyclic by construction (`spec.md` §9: operators form a
    // DAG). Assert that invariant here rather than special-casing it at
    // every call site downstream.
    invariant!(!is_cyclic_directed(&table_graph(&plan)));
    Ok(plan)
}

fn plan_node(ast: &Ast, schema: &Schema) -> ZeroResult<PlanNode> {
    let where_ = match &ast.where_ {
        Some(e) => Some(plan_expr(e, &ast.table, schema)?),
        None => None,
    };

    let mut seen_names = HashSet::with_capacity(ast.related.len());
    let mut related = Vec::with_capacity(ast.related.len());
    for r in &ast.related {
        if !seen_names.insert(r.name.clone()) {
            return Err(zero_core::errors::internal_err(format!(
                "relationship {} is related more than once under table {}",
                r.name, ast.table
            )));
        }
        related.push(plan_related(r, &ast.table, schema)?);
    }

    Ok(PlanNode {
        table: ast.table.clone(),
        where_,
        order_by: ast.order_by.clone(),
        limit: ast.limit,
        start: ast.start.clone(),
        related,
    })
}

fn plan_related(related: &Related, parent_table: &str, schema: &Schema) -> ZeroResult<PlanRelated> {
    let relationship = schema.relationship(parent_table, &related.name)?.clone();
    let child = plan_node(&related.child, schema)?;
    Ok(PlanRelated {
        name: related.name.clone(),
        relationship,
        child: Box::new(child),
    })
}

fn plan_expr(e: &Expr, table: &str, schema: &Schema) -> ZeroResult<PlanExpr> {
    Ok(match e {
        Expr::And(parts) => PlanExpr::And(parts.iter().map(|p| plan_expr(p, table, schema)).collect::<ZeroResult<_>>()?),
        Expr::Or(parts) => PlanExpr::Or(parts.iter().map(|p| plan_expr(p, table, schema)).collect::<ZeroResult<_>>()?),
        Expr::Not(inner) => PlanExpr::Not(Box::new(plan_expr(inner, table, schema)?)),
        Expr::Compare { .. } => PlanExpr::Compare(e.clone()),
        Expr::Exists(ex) => PlanExpr::Exists(plan_exists(ex, table, schema)?),
    })
}

fn plan_exists(ex: &ExistsExpr, table: &str, schema: &Schema) -> ZeroResult<PlanExists> {
    let relationship = schema.relationship(table, &ex.relationship)?.clone();
    let where_ = match &ex.where_ {
        Some(w) => Some(Box::new(plan_expr(w, &relationship.child_table, schema)?)),
        None => None,
    };
    Ok(PlanExists {
        relationship,
        flip: ex.flip,
        where_,
    })
}

/// The table-traversal graph implied by `plan`'s RELATED/EXISTS edges, used
/// only to assert acyclicity in [`build_plan`]. Self-joins (a table related
/// to itself) are represented as distinct nodes per tree position, not
/// merged by table name, so a legitimate self-referential tree (e.g. a
/// comment thread's `parent` relationship) is never mistaken for a cycle.
fn table_graph(plan: &PlanNode) -> DiGraph<(), ()> {
    let mut graph = DiGraph::new();
    add_subtree(&mut graph, plan);
    graph
}

fn add_subtree(graph: &mut DiGraph<(), ()>, node: &PlanNode) {
    let parent = graph.add_node(());
    add_exists_edges(graph, parent, node.where_.as_ref());
    for r in &node.related {
        let child_root = graph.add_node(());
        graph.add_edge(parent, child_root, ());
        add_subtree_from(graph, child_root, &r.child);
    }
}

fn add_subtree_from(graph: &mut DiGraph<(), ()>, node_idx: petgraph::graph::NodeIndex, node: &PlanNode) {
    add_exists_edges(graph, node_idx, node.where_.as_ref());
    for r in &node.related {
        let child_root = graph.add_node(());
        graph.add_edge(node_idx, child_root, ());
        add_subtree_from(graph, child_root, &r.child);
    }
}

fn add_exists_edges(graph: &mut DiGraph<(), ()>, from: petgraph::graph::NodeIndex, expr: Option<&PlanExpr>) {
    let Some(expr) = expr else { return };
    match expr {
        PlanExpr::And(parts) | PlanExpr::Or(parts) => {
            for p in parts {
                add_exists_edges(graph, from, Some(p));
            }
        }
        PlanExpr::Not(inner) => add_exists_edges(graph, from, Some(inner)),
        PlanExpr::Compare(_) => {}
        PlanExpr::Exists(ex) => {
            let child = graph.add_node(());
            graph.add_edge(from, child, ());
            add_exists_edges(graph, child, ex.where_.as_deref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_ast::{complete, Ast};
    use zero_core::{Cardinality, ColumnKind, ColumnSpec, TableSpec};

    fn schema_with_self_relationship() -> Schema {
        let mut s = Schema::default();
        s.tables.insert(
            "node".into(),
            TableSpec {
                name: "node".into(),
                columns: vec![
                    ColumnSpec { name: "id".into(), kind: ColumnKind::String },
                    ColumnSpec { name: "parentId".into(), kind: ColumnKind::String },
                    ColumnSpec { name: "_0_version".into(), kind: ColumnKind::String },
                ],
                primary_key: vec!["id".into()],
                unique_keys: vec![],
                zero_version_column: "_0_version".into(),
            },
        );
        s.relationships.push(Relationship {
            name: "parent".into(),
            parent_table: "node".into(),
            child_table: "node".into(),
            correlation: vec![("parentId".into(), "id".into())],
            cardinality: Cardinality::One,
            junction: None,
        });
        s
    }

    #[test]
    fn self_relationship_nested_several_levels_deep_is_not_a_cycle() {
        let schema = schema_with_self_relationship();
        let ast = Ast::new("node").with_related(Related {
            name: "parent".into(),
            child: Box::new(Ast::new("node").with_related(Related {
                name: "parent".into(),
                child: Box::new(Ast::new("node")),
                hidden_junction: false,
            })),
            hidden_junction: false,
        });
        let completed = complete(ast, &schema).unwrap();
        assert!(build_plan(&completed, &schema).is_ok());
    }

    #[test]
    fn duplicate_relationship_name_under_one_parent_is_rejected() {
        let schema = schema_with_self_relationship();
        let ast = Ast::new("node")
            .with_related(Related {
                name: "parent".into(),
                child: Box::new(Ast::new("node")),
                hidden_junction: false,
            })
            .with_related(Related {
                name: "parent".into(),
                child: Box::new(Ast::new("node")),
                hidden_junction: false,
            });
        let completed = complete(ast, &schema).unwrap();
        assert!(build_plan(&completed, &schema).is_err());
    }
}
