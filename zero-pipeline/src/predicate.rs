//! Stateless re-evaluation of a [`PlanExpr`] against a single row: used
//! wherever a WHERE clause only needs to gate a pull-based fetch (a RELATED
//! child's own filter, an EXISTS subquery's nested `where_`) rather than
//! drive the live incremental operators at the pipeline root (`spec.md`
//! §4.2.2, §4.2.3).

use zero_core::errors::ZeroResult;
use zero_core::Row;

use crate::plan::{PlanExists, PlanExpr};
use crate::source::{child_source_for, BuildContext};

/// Whether `expr` contains an `EXISTS` node anywhere in its tree. The root
/// pipeline builds a stateful [`crate::pipeline::WhereStage`] wherever this
/// is true (existence has to be tracked incrementally); everywhere else a
/// plain boolean predicate suffices.
pub fn contains_exists(expr: &PlanExpr) -> bool {
    match expr {
        PlanExpr::Exists(_) => true,
        PlanExpr::Not(inner) => contains_exists(inner),
        PlanExpr::And(parts) | PlanExpr::Or(parts) => parts.iter().any(contains_exists),
        PlanExpr::Compare(_) => false,
    }
}

/// Evaluates `expr` against `row` directly, re-fetching through `ctx` for
/// any `EXISTS` node encountered. Used to filter a `RowSource::fetch` result
/// set at rest, not to drive incremental change propagation.
pub fn row_matches(expr: &PlanExpr, row: &Row, ctx: &BuildContext) -> ZeroResult<bool> {
    Ok(match expr {
        PlanExpr::And(parts) => {
            for p in parts {
                if !row_matches(p, row, ctx)? {
                    return Ok(false);
                }
            }
            true
        }
        PlanExpr::Or(parts) => {
            for p in parts {
                if row_matches(p, row, ctx)? {
                    return Ok(true);
                }
            }
            false
        }
        PlanExpr::Not(inner) => !row_matches(inner, row, ctx)?,
        PlanExpr::Compare(e) => eval_compare_expr(e, row),
        PlanExpr::Exists(ex) => exists_matches(ex, row, ctx)?,
    })
}

fn eval_compare_expr(e: &zero_ast::Expr, row: &Row) -> bool {
    match e {
        zero_ast::Expr::Compare { column, op, value } => {
            let left = row.get(column).cloned().unwrap_or(zero_core::Value::Null);
            zero_ast::compare(*op, &left, value)
        }
        // `PlanExpr::Compare` only ever wraps a leaf `Expr::Compare` node
        // (see `plan::plan_expr`); anything else reaching here would be a
        // bug in the plan compiler rather than a real query shape.
        _ => false,
    }
}

fn exists_matches(ex: &PlanExists, row: &Row, ctx: &BuildContext) -> ZeroResult<bool> {
    let source = child_source_for(&ex.relationship, ex.where_.as_deref(), ctx)?;
    let mut constraint = zero_dataflow::Constraint::none();
    for (parent_col, child_col) in correlation_for_exists(ex) {
        if let Some(v) = row.get(&parent_col) {
            constraint = constraint.with(child_col, v.clone());
        }
    }
    Ok(!source.fetch(&constraint)?.is_empty())
}

/// The parent-side correlation an `EXISTS` check runs over: the
/// relationship's own correlation, or (for a two-hop relationship) the
/// parent-to-junction half of it, since the junction-to-child half is
/// folded into the child source itself (see
/// [`crate::source::child_source_for`]).
fn correlation_for_exists(ex: &PlanExists) -> Vec<(String, String)> {
    match &ex.relationship.junction {
        Some(j) => j.parent_to_junction.clone(),
        None => ex.relationship.correlation.clone(),
    }
}
