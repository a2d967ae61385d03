//! Sort-order maintenance (`spec.md` §4.2.6).

use zero_core::{Value, ZeroResult};

use crate::change::Change;
use crate::source::OrderDirection;

pub struct OrderBy {
    order: Vec<(String, OrderDirection)>,
}

impl OrderBy {
    pub fn new(order: Vec<(String, OrderDirection)>) -> Self {
        OrderBy { order }
    }

    fn sort_key(&self, row: &zero_core::Row) -> Vec<Value> {
        self.order
            .iter()
            .map(|(c, _)| row.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Passes `add`/`remove`/`child` through unchanged (ordering is enforced
    /// by whatever maintains the materialized view, not by this operator
    /// rewriting keys). An `edit` decomposes into `remove` old + `add` new
    /// only when the sort key actually changed.
    pub fn push(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        match change {
            Change::Edit { old, new } => {
                if self.sort_key(&old) == self.sort_key(&new) {
                    Ok(vec![Change::Edit { old, new }])
                } else {
                    Ok(vec![
                        Change::Remove { row: old, children: Default::default() },
                        Change::Add { row: new, children: Default::default() },
                    ])
                }
            }
            other => Ok(vec![other]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::Row;

    fn row(price: i64) -> Row {
        Row::from_columns([("price".to_string(), Value::Int(price))])
    }

    #[test]
    fn edit_unchanged_sort_key_passes_through() {
        let mut ob = OrderBy::new(vec![("price".to_string(), OrderDirection::Asc)]);
        let out = ob.push(Change::Edit { old: row(10), new: row(10) }).unwrap();
        assert_eq!(out, vec![Change::Edit { old: row(10), new: row(10) }]);
    }

    #[test]
    fn edit_changing_sort_key_decomposes() {
        let mut ob = OrderBy::new(vec![("price".to_string(), OrderDirection::Asc)]);
        let out = ob.push(Change::Edit { old: row(10), new: row(20) }).unwrap();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Change::Remove { .. }));
        assert!(matches!(out[1], Change::Add { .. }));
    }
}
