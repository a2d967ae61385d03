//! AST normalization (`spec.md` §4.5): push negations down, flatten
//! associative AND/OR, drop tautologies/contradictions, and canonicalize the
//! order of semantically-unordered children so that behaviorally identical
//! queries produce identical trees (a prerequisite for canonical hashing).

use crate::expr::{CompareOp, Expr};

/// Simplify `e` to a normal form. Idempotent: `simplify(simplify(e)) ==
/// simplify(e)`.
pub fn simplify(e: Expr) -> Expr {
    let pushed = push_not(e, false);
    let flattened = flatten(pushed);
    fold(flattened)
}

/// Push `NOT` down to the leaves via De Morgan's laws, eliminating double
/// negation. `NOT EXISTS` has no equivalent comparison form and is left as
/// `Not(Exists(..))`; `complete` rejects that shape explicitly (`spec.md` §3
/// invariant (iii)).
fn push_not(e: Expr, negate: bool) -> Expr {
    match e {
        Expr::Not(inner) => push_not(*inner, !negate),
        Expr::And(parts) => {
            let pushed: Vec<Expr> = parts.into_iter().map(|p| push_not(p, negate)).collect();
            if negate {
                Expr::Or(pushed)
            } else {
                Expr::And(pushed)
            }
        }
        Expr::Or(parts) => {
            let pushed: Vec<Expr> = parts.into_iter().map(|p| push_not(p, negate)).collect();
            if negate {
                Expr::And(pushed)
            } else {
                Expr::Or(pushed)
            }
        }
        Expr::Compare { column, op, value } => {
            if negate {
                match op.negate() {
                    Some(negated) => Expr::Compare {
                        column,
                        op: negated,
                        value,
                    },
                    None => Expr::Not(Box::new(Expr::Compare { column, op, value })),
                }
            } else {
                Expr::Compare { column, op, value }
            }
        }
        Expr::Exists(mut ex) => {
            ex.where_ = ex.where_.map(|w| Box::new(push_not(*w, false)));
            if negate {
                Expr::Not(Box::new(Expr::Exists(ex)))
            } else {
                Expr::Exists(ex)
            }
        }
    }
}

/// Flatten nested associative AND-within-AND / OR-within-OR.
fn flatten(e: Expr) -> Expr {
    match e {
        Expr::And(parts) => {
            let mut out = Vec::with_capacity(parts.len());
            for p in parts {
                match flatten(p) {
                    Expr::And(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Expr::And(out)
        }
        Expr::Or(parts) => {
            let mut out = Vec::with_capacity(parts.len());
            for p in parts {
                match flatten(p) {
                    Expr::Or(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Expr::Or(out)
        }
        Expr::Not(inner) => Expr::Not(Box::new(flatten(*inner))),
        Expr::Exists(mut ex) => {
            ex.where_ = ex.where_.map(|w| Box::new(flatten(*w)));
            Expr::Exists(ex)
        }
        leaf @ Expr::Compare { .. } => leaf,
    }
}

/// Fold tautologies/contradictions (`a AND FALSE => FALSE`, `a OR TRUE =>
/// TRUE`, empty AND => TRUE, empty OR => FALSE), dedup identical children,
/// and sort remaining children into a canonical (commutativity-respecting)
/// order.
fn fold(e: Expr) -> Expr {
    match e {
        Expr::And(parts) => {
            let mut out = Vec::with_capacity(parts.len());
            for p in parts {
                match fold(p) {
                    Expr::Compare { ref column, value: zero_core::Value::Bool(false), .. }
                        if column.is_empty() =>
                    {
                        return Expr::literal(false);
                    }
                    Expr::Compare { ref column, value: zero_core::Value::Bool(true), .. }
                        if column.is_empty() => {}
                    other => out.push(other),
                }
            }
            canonicalize_and_or(out, true)
        }
        Expr::Or(parts) => {
            let mut out = Vec::with_capacity(parts.len());
            for p in parts {
                match fold(p) {
                    Expr::Compare { ref column, value: zero_core::Value::Bool(true), .. }
                        if column.is_empty() =>
                    {
                        return Expr::literal(true);
                    }
                    Expr::Compare { ref column, value: zero_core::Value::Bool(false), .. }
                        if column.is_empty() => {}
                    other => out.push(other),
                }
            }
            canonicalize_and_or(out, false)
        }
        Expr::Not(inner) => Expr::Not(Box::new(fold(*inner))),
        Expr::Exists(mut ex) => {
            ex.where_ = ex.where_.map(|w| Box::new(fold(*w)));
            Expr::Exists(ex)
        }
        leaf @ Expr::Compare { .. } => leaf,
    }
}

fn canonicalize_and_or(mut parts: Vec<Expr>, is_and: bool) -> Expr {
    parts.sort_by(|a, b| canonical_key(a).cmp(&canonical_key(b)));
    parts.dedup_by(|a, b| canonical_key(a) == canonical_key(b));
    match parts.len() {
        0 => Expr::literal(is_and),
        1 => parts.into_iter().next().unwrap(),
        _ => {
            if is_and {
                Expr::And(parts)
            } else {
                Expr::Or(parts)
            }
        }
    }
}

/// A deterministic, structural sort key. `Expr`'s `Debug` output is itself
/// deterministic (field order is declaration order, `Vec`s print in order),
/// so it doubles as a cheap canonical key without needing a second
/// hand-written serializer here; [`crate::hash`] has the real one used for
/// the externally-visible content hash.
fn canonical_key(e: &Expr) -> String {
    format!("{e:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExistsExpr;
    use zero_core::Value;

    fn cmp(col: &str, v: i64) -> Expr {
        Expr::Compare {
            column: col.to_string(),
            op: CompareOp::Eq,
            value: Value::Int(v),
        }
    }

    #[test]
    fn double_negation_eliminated() {
        let e = Expr::not(Expr::not(cmp("a", 1)));
        assert_eq!(simplify(e), cmp("a", 1));
    }

    #[test]
    fn not_and_becomes_or_of_negated_compares() {
        let e = Expr::not(Expr::and([cmp("a", 1), cmp("a", 2)]));
        let simplified = simplify(e);
        match simplified {
            Expr::Or(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn and_with_false_collapses_to_false() {
        let e = Expr::and([cmp("a", 1), Expr::literal(false)]);
        assert_eq!(simplify(e), Expr::literal(false));
    }

    #[test]
    fn or_with_true_collapses_to_true() {
        let e = Expr::or([cmp("a", 1), Expr::literal(true)]);
        assert_eq!(simplify(e), Expr::literal(true));
    }

    #[test]
    fn and_branch_order_is_canonicalized() {
        let a = simplify(Expr::and([cmp("a", 1), cmp("b", 2)]));
        let b = simplify(Expr::and([cmp("b", 2), cmp("a", 1)]));
        assert_eq!(a, b);
    }

    #[test]
    fn not_exists_survives_simplification_unchanged_in_shape() {
        let ex = ExistsExpr {
            relationship: "owner".into(),
            where_: None,
            flip: false,
        };
        let e = Expr::not(Expr::Exists(ex));
        let simplified = simplify(e);
        assert!(matches!(simplified, Expr::Not(inner) if matches!(*inner, Expr::Exists(_))));
    }

    #[test]
    fn simplify_is_idempotent() {
        let e = Expr::and([
            Expr::or([cmp("a", 1), cmp("b", 2)]),
            Expr::not(Expr::not(cmp("c", 3))),
        ]);
        let once = simplify(e);
        let twice = simplify(once.clone());
        assert_eq!(once, twice);
    }
}
