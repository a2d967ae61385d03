//! The change-event vocabulary operators speak (`spec.md` §4.2): `add`,
//! `remove`, `edit`, `child`, and `output-complete`.

use std::collections::BTreeMap;

use zero_core::{Row, RowKey};

/// A relationship's materialized children as attached to a parent `add`/
/// `remove` event — either a single nested row (one-to-one/many-to-one) or
/// an ordered sequence (one-to-many).
#[derive(Debug, Clone, PartialEq)]
pub enum ChildSlot {
    Singular(Option<Row>),
    Sequence(Vec<Row>),
}

pub type ChildMap = BTreeMap<String, ChildSlot>;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Add {
        row: Row,
        children: ChildMap,
    },
    Remove {
        row: Row,
        children: ChildMap,
    },
    /// Same key, ordering unaffected; decomposed into `Remove`+`Add` by the
    /// producing operator whenever that's not true.
    Edit {
        old: Row,
        new: Row,
    },
    /// A relationship beneath an already-emitted parent changed.
    Child {
        parent_key: RowKey,
        relationship: String,
        change: Box<Change>,
    },
    /// The operator has finished hydrating its initial result set.
    OutputComplete,
}

impl Change {
    /// The primary key of the row this change concerns, for `Add`/`Remove`/
    /// `Edit` (keyed by `pk`); `None` for `Child`/`OutputComplete`, which
    /// aren't about a single row of this operator's own output.
    pub fn row_key(&self, pk: &[String]) -> Option<RowKey> {
        match self {
            Change::Add { row, .. } | Change::Remove { row, .. } => Some(row.key_for(pk)),
            Change::Edit { new, .. } => Some(new.key_for(pk)),
            Change::Child { .. } | Change::OutputComplete => None,
        }
    }
}
