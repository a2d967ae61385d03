//! The pull-side contract operators and storage share: `fetch(constraint)`
//! over an equality mapping, optionally ordered (`spec.md` §4.1/§9's "small
//! fixed capability set").

use std::collections::BTreeMap;

use zero_core::{Row, Value};

/// Output ordering direction. Operators are deliberately kept unaware of
/// `zero-ast`'s `Expr`/`OrderDirection` types (`spec.md` §9: operators are
/// polymorphic over a small fixed capability set, not over the AST);
/// `zero-pipeline` translates from the AST's types when it wires a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// An equality-only constraint: column name → required value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraint(BTreeMap<String, Value>);

impl Constraint {
    pub fn none() -> Self {
        Constraint(BTreeMap::new())
    }

    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.0.insert(column.into(), value);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.0.iter().all(|(c, v)| row.get(c) == Some(v))
    }
}

/// Anything that can be pulled from: table storage, or another operator's
/// currently-materialized output, used by `Join`/`Existence` to resolve the
/// child side of a correlation.
pub trait RowSource: Send + Sync {
    fn fetch(&self, constraint: &Constraint) -> zero_core::ZeroResult<Vec<Row>>;
}

/// A keyset-pagination cursor (`spec.md` §4.2.7): skip rows whose `order`
/// prefix sorts strictly before `values` (or at-or-before, if `inclusive`).
#[derive(Debug, Clone, PartialEq)]
pub struct SeekKey {
    pub values: Vec<Value>,
    pub inclusive: bool,
}

pub(crate) fn sort_key(row: &Row, order: &[(String, OrderDirection)]) -> Vec<Value> {
    order
        .iter()
        .map(|(c, _)| row.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Compares two order-key tuples honoring each column's direction.
pub(crate) fn cmp_with_order(
    a: &[Value],
    b: &[Value],
    order: &[(String, OrderDirection)],
) -> std::cmp::Ordering {
    for (i, (_, dir)) in order.iter().enumerate() {
        let ord = a[i].cmp(&b[i]);
        let ord = match dir {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}
