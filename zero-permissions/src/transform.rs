//! Select-time AST rewriting (`spec.md` §4.6): rather than evaluating rules
//! against already-materialized rows, the select path resolves each rule's
//! auth-claim operands to literals and ANDs the resulting predicate into the
//! query's WHERE clause — at the root, inside every correlated `EXISTS`
//! subquery, and recursively down every `RELATED` child — so that permission
//! filtering becomes an ordinary part of the dataflow the query already
//! builds, rather than a separate pass.

use sha2::{Digest, Sha256};

use zero_ast::{Ast, CompareOp, Expr, ExistsExpr, Related};
use zero_core::errors::ZeroResult;
use zero_core::Schema;

use crate::claims::AuthClaims;
use crate::eval::eval_compare;
use crate::rule::{Operand, Policy, PolicyAction, RuleExpr};

/// A resolved operand: either still tied to a row column (to be compared at
/// query-evaluation time) or fully resolved to a literal value already.
enum Resolved {
    Column(String),
    Literal(zero_core::Value),
}

fn resolve_operand(op: &Operand, claims: &AuthClaims) -> Resolved {
    match op {
        Operand::Column(c) => Resolved::Column(c.clone()),
        Operand::Claim(path) => Resolved::Literal(claims.get_path(path)),
        Operand::Literal(v) => Resolved::Literal(v.clone()),
    }
}

/// The operator obtained by swapping the two sides of a comparison (used when
/// an operand resolves to a literal on the left and the column ends up on the
/// right, since [`Expr::Compare`] always puts the column on the left).
fn flip(op: CompareOp) -> Option<CompareOp> {
    use CompareOp::*;
    Some(match op {
        Eq => Eq,
        Ne => Ne,
        Lt => Gt,
        Le => Ge,
        Gt => Lt,
        Ge => Le,
        Like => return None,
    })
}

/// Resolves a [`RuleExpr`] against `claims` into a [`zero_ast::Expr`] fit for
/// injection into a query's WHERE tree. Claim operands fold away entirely;
/// column operands become ordinary `Expr::Compare` nodes the dataflow's
/// `Filter` operator evaluates per row, same as any other predicate.
fn resolve_for_query(rule: &RuleExpr, claims: &AuthClaims) -> Expr {
    match rule {
        RuleExpr::Literal(b) => Expr::literal(*b),
        RuleExpr::And(parts) => Expr::and(parts.iter().map(|p| resolve_for_query(p, claims))),
        RuleExpr::Or(parts) => Expr::or(parts.iter().map(|p| resolve_for_query(p, claims))),
        RuleExpr::Not(inner) => Expr::not(resolve_for_query(inner, claims)),
        RuleExpr::Compare { left, op, right } => {
            match (resolve_operand(left, claims), resolve_operand(right, claims)) {
                (Resolved::Column(c), Resolved::Literal(v)) => Expr::Compare { column: c, op: *op, value: v },
                (Resolved::Literal(v), Resolved::Column(c)) => match flip(*op) {
                    Some(flipped) => Expr::Compare { column: c, op: flipped, value: v },
                    // A pattern operand (Like) can't sensibly sit on the
                    // right of a column; a rule shaped that way can never be
                    // satisfied, so it resolves to a denial rather than
                    // panicking.
                    None => Expr::literal(false),
                },
                (Resolved::Literal(l), Resolved::Literal(r)) => Expr::literal(eval_compare(&l, *op, &r)),
                // Column-to-column comparisons (e.g. `a.x = a.y`) aren't
                // representable in the single-row `Expr::Compare` shape the
                // query AST supports; such rules can only be checked at
                // mutation time via `crate::eval::eval_rule`, not rewritten
                // into a query.
                (Resolved::Column(_), Resolved::Column(_)) => Expr::literal(false),
            }
        }
    }
}

/// The combined (OR'd) predicate for `table`/`action` under `claims`. Tables
/// with no matching rules deny by default (`spec.md` §4.6's implicit OR over
/// zero rules is `FALSE`), which falls out of [`Expr::or`] on an empty list
/// folding to `literal(false)` under [`zero_ast::simplify`].
fn action_predicate(policy: &Policy, table: &str, action: PolicyAction, claims: &AuthClaims) -> Expr {
    let rules = policy.rules_for(table, action);
    let resolved = Expr::or(rules.iter().map(|r| resolve_for_query(r, claims)));
    zero_ast::simplify(resolved)
}

fn and_predicate(existing: Option<Expr>, predicate: Expr) -> Expr {
    match existing {
        Some(e) => zero_ast::simplify(Expr::and([e, predicate])),
        None => predicate,
    }
}

/// Rewrites `ast` so that every correlated position — the root query, every
/// `RELATED` subtree, and every `EXISTS` subquery — has its table's select
/// policy ANDed into its WHERE clause.
pub fn transform_query(mut ast: Ast, schema: &Schema, policy: &Policy, claims: &AuthClaims) -> ZeroResult<Ast> {
    let where_ = match ast.where_.take() {
        Some(w) => Some(transform_expr(w, &ast.table, schema, policy, claims)?),
        None => None,
    };
    let predicate = action_predicate(policy, &ast.table, PolicyAction::Select, claims);
    ast.where_ = Some(and_predicate(where_, predicate));

    let mut related = Vec::with_capacity(ast.related.len());
    for r in ast.related {
        let child = transform_query(*r.child, schema, policy, claims)?;
        related.push(Related {
            name: r.name,
            child: Box::new(child),
            hidden_junction: r.hidden_junction,
        });
    }
    ast.related = related;
    Ok(ast)
}

/// Walks a WHERE tree belonging to a query over `table`, injecting the
/// target table's select policy into every `EXISTS` subquery it finds.
fn transform_expr(e: Expr, table: &str, schema: &Schema, policy: &Policy, claims: &AuthClaims) -> ZeroResult<Expr> {
    match e {
        Expr::And(parts) => Ok(Expr::And(
            parts
                .into_iter()
                .map(|p| transform_expr(p, table, schema, policy, claims))
                .collect::<ZeroResult<Vec<_>>>()?,
        )),
        Expr::Or(parts) => Ok(Expr::Or(
            parts
                .into_iter()
                .map(|p| transform_expr(p, table, schema, policy, claims))
                .collect::<ZeroResult<Vec<_>>>()?,
        )),
        Expr::Not(inner) => Ok(Expr::not(transform_expr(*inner, table, schema, policy, claims)?)),
        Expr::Compare { .. } => Ok(e),
        Expr::Exists(ex) => {
            let child_table = schema.relationship(table, &ex.relationship)?.child_table.clone();
            let inner = match ex.where_ {
                Some(w) => Some(transform_expr(*w, &child_table, schema, policy, claims)?),
                None => None,
            };
            let predicate = action_predicate(policy, &child_table, PolicyAction::Select, claims);
            Ok(Expr::Exists(ExistsExpr {
                relationship: ex.relationship,
                where_: Some(Box::new(and_predicate(inner, predicate))),
                flip: ex.flip,
            }))
        }
    }
}

/// A stable fingerprint of `policy`, folded into CVR query identity so that a
/// policy change invalidates cached view state the same way a query change
/// does (`spec.md` §4.5 "C5": the hash key includes anything that can change
/// what rows a query returns).
pub fn policy_fingerprint(policy: &Policy) -> String {
    let mut table_names: Vec<&String> = policy.tables.keys().collect();
    table_names.sort();

    let mut hasher = Sha256::new();
    for table in table_names {
        hasher.update(table.as_bytes());
        let table_policy = &policy.tables[table];
        for action in [
            PolicyAction::Select,
            PolicyAction::Insert,
            PolicyAction::UpdatePre,
            PolicyAction::UpdatePost,
            PolicyAction::Delete,
        ] {
            hasher.update([action as u8]);
            for rule in table_policy.rules_for(action) {
                hasher.update(format!("{rule:?}").as_bytes());
            }
        }
    }
    format!("{:x}", hasher.finalize())
}
