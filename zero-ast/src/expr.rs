//! The WHERE-clause expression tree of `spec.md` §3: "tree of
//! AND/OR/NOT/compare/correlated-subquery".

use serde::{Deserialize, Serialize};
use zero_core::Value;

/// SQL-style row-level comparison: any operand touching `NULL` compares
/// false rather than true-or-false (`spec.md` §4.6's framing of unresolved
/// claims as comparing false against any condition applies equally to a
/// `Filter` predicate comparing a missing column). Shared by the dataflow
/// predicates `zero-pipeline` compiles from a WHERE clause and by
/// `zero-permissions`'s direct rule evaluation, so both see identical
/// comparison semantics.
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        CompareOp::Lt => left < right,
        CompareOp::Le => left <= right,
        CompareOp::Gt => left > right,
        CompareOp::Ge => left >= right,
        CompareOp::Like => match (left, right) {
            (Value::String(l), Value::String(r)) => sql_like(l, r),
            _ => false,
        },
    }
}

/// Minimal SQL `LIKE`: `%` matches any run of characters, `_` matches
/// exactly one. No escape-character support.
fn sql_like(value: &str, pattern: &str) -> bool {
    fn matches(v: &[char], p: &[char]) -> bool {
        match p.first() {
            None => v.is_empty(),
            Some('%') => matches(v, &p[1..]) || (!v.is_empty() && matches(&v[1..], p)),
            Some('_') => !v.is_empty() && matches(&v[1..], &p[1..]),
            Some(c) => v.first() == Some(c) && matches(&v[1..], &p[1..]),
        }
    }
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    matches(&v, &p)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl CompareOp {
    /// The operator obtained by pushing a `NOT` through this comparison
    /// (`spec.md` §3 invariant (iii): negations are pushed down rather than
    /// represented directly). `Like` has no negated comparison primitive, so
    /// it is intentionally excluded from this fold.
    pub fn negate(self) -> Option<CompareOp> {
        use CompareOp::*;
        Some(match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Le => Gt,
            Gt => Le,
            Ge => Lt,
            Like => return None,
        })
    }
}

/// A correlated EXISTS subquery, the basis for both simple existence checks
/// and (via two hops) junction-table relationships (`spec.md` §4.2.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistsExpr {
    /// Name of the relationship this existence check is correlated through
    /// (resolved against the schema at pipeline-build time).
    pub relationship: String,
    /// Additional filter applied within the correlated subquery.
    pub where_: Option<Box<Expr>>,
    /// Whether the join realizing this existence check should run flipped
    /// (`spec.md` §4.2.2) — set when the subquery is expected to be smaller,
    /// or when it sits beneath an OR branch destined for `UnionFanIn`.
    pub flip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    Exists(ExistsExpr),
}

impl Expr {
    pub fn and(parts: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(parts.into_iter().collect())
    }

    pub fn or(parts: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(parts.into_iter().collect())
    }

    pub fn not(e: Expr) -> Expr {
        Expr::Not(Box::new(e))
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Expr {
        Expr::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value,
        }
    }

    /// Literal `TRUE` / `FALSE`, represented as a tautological/contradictory
    /// comparison so [`crate::simplify`] has a single representation to fold
    /// on (`spec.md` §4.5 "simplify `a AND FALSE` to `FALSE`").
    pub fn literal(b: bool) -> Expr {
        Expr::Compare {
            column: String::new(),
            op: CompareOp::Eq,
            value: Value::Bool(b),
        }
    }

    pub fn as_literal(&self) -> Option<bool> {
        match self {
            Expr::Compare {
                column,
                op: CompareOp::Eq,
                value: Value::Bool(b),
            } if column.is_empty() => Some(*b),
            _ => None,
        }
    }

    /// Whether this subtree contains a correlated-subquery node anywhere,
    /// used by the pipeline builder to decide `FanIn` vs `UnionFanIn`
    /// (`spec.md` §4.2.4).
    pub fn contains_exists(&self) -> bool {
        match self {
            Expr::Exists(_) => true,
            Expr::Not(e) => e.contains_exists(),
            Expr::And(parts) | Expr::Or(parts) => parts.iter().any(Expr::contains_exists),
            Expr::Compare { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_operand_never_compares_true() {
        assert!(!compare(CompareOp::Eq, &Value::Null, &Value::Int(1)));
        assert!(!compare(CompareOp::Ne, &Value::Int(1), &Value::Null));
    }

    #[test]
    fn like_supports_percent_and_underscore() {
        assert!(compare(CompareOp::Like, &Value::String("hello".into()), &Value::String("h%".into())));
        assert!(compare(CompareOp::Like, &Value::String("hello".into()), &Value::String("h_llo".into())));
        assert!(!compare(CompareOp::Like, &Value::String("hello".into()), &Value::String("world".into())));
    }

    #[test]
    fn ordering_operators_compare_numerically() {
        assert!(compare(CompareOp::Gt, &Value::Int(3), &Value::Int(2)));
        assert!(!compare(CompareOp::Gt, &Value::Int(2), &Value::Int(3)));
    }
}
