//! Direct evaluation of a [`RuleExpr`] against a concrete row and claims set
//! — used for the row-level insert/update/delete checks of `spec.md` §4.6
//! (as opposed to the select path, which rewrites the query's WHERE clause
//! instead of evaluating anything directly; see [`crate::transform`]).

use zero_core::{Row, Value};

use crate::claims::AuthClaims;
use crate::rule::{Operand, RuleExpr};
use zero_ast::CompareOp;

fn resolve_operand(op: &Operand, row: &Row, claims: &AuthClaims) -> Value {
    match op {
        Operand::Column(c) => row.get(c).cloned().unwrap_or(Value::Null),
        Operand::Claim(path) => claims.get_path(path),
        Operand::Literal(v) => v.clone(),
    }
}

/// SQL-style NULL semantics, shared with the dataflow predicates
/// `zero-pipeline` compiles from a query's WHERE clause (`zero_ast::compare`).
pub(crate) fn eval_compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    zero_ast::compare(op, left, right)
}

/// Evaluates `rule` against `row`/`claims`, returning whether it allows the
/// action.
pub fn eval_rule(rule: &RuleExpr, row: &Row, claims: &AuthClaims) -> bool {
    match rule {
        RuleExpr::Literal(b) => *b,
        RuleExpr::And(parts) => parts.iter().all(|p| eval_rule(p, row, claims)),
        RuleExpr::Or(parts) => parts.iter().any(|p| eval_rule(p, row, claims)),
        RuleExpr::Not(inner) => !eval_rule(inner, row, claims),
        RuleExpr::Compare { left, op, right } => {
            let l = resolve_operand(left, row, claims);
            let r = resolve_operand(right, row, claims);
            eval_compare(&l, *op, &r)
        }
    }
}

/// Evaluates a set of (implicitly OR'd) allow rules.
pub fn eval_any(rules: &[RuleExpr], row: &Row, claims: &AuthClaims) -> bool {
    rules.iter().any(|r| eval_rule(r, row, claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(owner: &str) -> Row {
        Row::from_columns([("ownerId".to_string(), Value::String(owner.to_string()))])
    }

    #[test]
    fn owner_rule_allows_matching_row() {
        let claims = AuthClaims::new(json!({"userId": "u1"}));
        let rule = RuleExpr::allow_if_owner("ownerId", "userId");
        assert!(eval_rule(&rule, &row("u1"), &claims));
        assert!(!eval_rule(&rule, &row("u2"), &claims));
    }

    #[test]
    fn empty_rule_set_denies() {
        let claims = AuthClaims::anonymous();
        assert!(!eval_any(&[], &row("u1"), &claims));
    }

    #[test]
    fn like_supports_percent_and_underscore() {
        let h = Value::String("hello".to_string());
        assert!(eval_compare(&h, CompareOp::Like, &Value::String("h%".to_string())));
        assert!(eval_compare(&h, CompareOp::Like, &Value::String("h_llo".to_string())));
        assert!(!eval_compare(&h, CompareOp::Like, &Value::String("world".to_string())));
    }

    #[test]
    fn null_operand_never_matches() {
        let claims = AuthClaims::anonymous();
        let rule = RuleExpr::allow_if_owner("ownerId", "userId");
        assert!(!eval_rule(&rule, &row("u1"), &claims));
    }
}
