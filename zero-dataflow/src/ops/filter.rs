//! Stateless predicate filtering (`spec.md` §4.2.1).

use zero_core::{Row, ZeroResult};

use crate::change::Change;

/// A boxed row predicate. `zero-pipeline` compiles a `zero-ast::Expr` WHERE
/// clause into one of these; operators stay unaware of the AST entirely
/// (`spec.md` §9's "small fixed capability set").
pub type Predicate = Box<dyn Fn(&Row) -> bool + Send + Sync>;

pub struct Filter {
    predicate: Predicate,
}

impl Filter {
    pub fn new(predicate: Predicate) -> Self {
        Filter { predicate }
    }

    /// `add`/`remove` pass through when the predicate holds; `edit` may
    /// become `add`, `remove`, or `edit` depending on whether the old/new
    /// row satisfied the predicate; children pass through unchanged.
    pub fn push(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        match change {
            Change::Add { row, children } => {
                if (self.predicate)(&row) {
                    Ok(vec![Change::Add { row, children }])
                } else {
                    Ok(vec![])
                }
            }
            Change::Remove { row, children } => {
                if (self.predicate)(&row) {
                    Ok(vec![Change::Remove { row, children }])
                } else {
                    Ok(vec![])
                }
            }
            Change::Edit { old, new } => {
                match ((self.predicate)(&old), (self.predicate)(&new)) {
                    (true, true) => Ok(vec![Change::Edit { old, new }]),
                    (true, false) => Ok(vec![Change::Remove { row: old, children: Default::default() }]),
                    (false, true) => Ok(vec![Change::Add { row: new, children: Default::default() }]),
                    (false, false) => Ok(vec![]),
                }
            }
            Change::Child { .. } | Change::OutputComplete => Ok(vec![change]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::Value;

    fn row(price: i64) -> Row {
        Row::from_columns([("price".to_string(), Value::Int(price))])
    }

    fn over_15() -> Filter {
        Filter::new(Box::new(|r: &Row| matches!(r.get("price"), Some(Value::Int(p)) if *p > 15)))
    }

    #[test]
    fn add_passes_when_predicate_holds() {
        let mut f = over_15();
        let out = f.push(Change::Add { row: row(20), children: Default::default() }).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn add_is_dropped_when_predicate_fails() {
        let mut f = over_15();
        let out = f.push(Change::Add { row: row(10), children: Default::default() }).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn edit_crossing_the_predicate_boundary_decomposes() {
        let mut f = over_15();
        let out = f
            .push(Change::Edit { old: row(20), new: row(12) })
            .unwrap();
        assert_eq!(out, vec![Change::Remove { row: row(20), children: Default::default() }]);
    }

    #[test]
    fn edit_staying_inside_the_predicate_passes_through() {
        let mut f = over_15();
        let out = f.push(Change::Edit { old: row(20), new: row(25) }).unwrap();
        assert_eq!(out, vec![Change::Edit { old: row(20), new: row(25) }]);
    }
}
