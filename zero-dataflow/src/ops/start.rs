//! Keyset-pagination cursor (`spec.md` §4.2.7): built as a predicate over the
//! generic [`Filter`], since "skip rows before a prefix" is exactly a
//! stateless per-row predicate like any other.

use crate::ops::filter::Filter;
use crate::source::{cmp_with_order, OrderDirection, SeekKey};

pub fn start(order: Vec<(String, OrderDirection)>, cursor: SeekKey) -> Filter {
    Filter::new(Box::new(move |row| {
        let row_key: Vec<_> = order.iter().map(|(c, _)| row.get(c).cloned().unwrap_or(zero_core::Value::Null)).collect();
        let ord = cmp_with_order(&row_key, &cursor.values, &order);
        match ord {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => cursor.inclusive,
            std::cmp::Ordering::Less => false,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Change;
    use zero_core::{Row, Value};

    fn row(price: i64) -> Row {
        Row::from_columns([("price".to_string(), Value::Int(price))])
    }

    #[test]
    fn exclusive_start_skips_the_boundary_row() {
        let mut f = start(vec![("price".to_string(), OrderDirection::Asc)], SeekKey { values: vec![Value::Int(20)], inclusive: false });
        let at_boundary = f.push(Change::Add { row: row(20), children: Default::default() }).unwrap();
        let past_boundary = f.push(Change::Add { row: row(21), children: Default::default() }).unwrap();
        assert!(at_boundary.is_empty());
        assert_eq!(past_boundary.len(), 1);
    }

    #[test]
    fn inclusive_start_keeps_the_boundary_row() {
        let mut f = start(vec![("price".to_string(), OrderDirection::Asc)], SeekKey { values: vec![Value::Int(20)], inclusive: true });
        let at_boundary = f.push(Change::Add { row: row(20), children: Default::default() }).unwrap();
        assert_eq!(at_boundary.len(), 1);
    }
}
