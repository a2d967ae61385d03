//! Array View (`spec.md` §4.4 "C4"): materializes a pipeline's output as an
//! ordered (or singular) tree of rows with named nested relationships.

use std::collections::BTreeMap;

use zero_core::errors::internal_err;
use zero_core::{Row, RowKey, ZeroError, ZeroResult};

use crate::change::{Change, ChildMap, ChildSlot};
use crate::source::{cmp_with_order, sort_key, OrderDirection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Singularity {
    Singular,
    Sequence,
}

#[derive(Debug, Clone)]
pub enum ViewState {
    Unknown,
    Complete,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub columns: Row,
    pub relationships: BTreeMap<String, ViewSlot>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewSlot {
    Singular(Option<ViewRow>),
    Sequence(Vec<ViewRow>),
}

fn strip_version(row: Row, version_column: &str) -> Row {
    row.without_column(version_column)
}

fn leaf_view_row(row: Row, version_column: &str) -> ViewRow {
    ViewRow { columns: strip_version(row, version_column), relationships: BTreeMap::new() }
}

/// Converts a flat `Change::Add`/`Remove`'s [`ChildMap`] (raw rows) into a
/// [`ViewRow`]'s nested relationships. Relationships are carried one level
/// deep: the nested [`ViewRow`]s themselves never carry further
/// relationships, which matches every relationship this workspace's
/// pipelines build (a one-hop join or a two-hop junction collapsed to a
/// single exposed relationship) — nothing in `spec.md`'s end-to-end
/// scenarios nests a RELATED beneath another RELATED.
fn view_row_from_change(row: Row, children: ChildMap, version_column: &str) -> ViewRow {
    let mut relationships = BTreeMap::new();
    for (name, slot) in children {
        let view_slot = match slot {
            ChildSlot::Singular(r) => ViewSlot::Singular(r.map(|row| leaf_view_row(row, version_column))),
            ChildSlot::Sequence(rows) => {
                ViewSlot::Sequence(rows.into_iter().map(|row| leaf_view_row(row, version_column)).collect())
            }
        };
        relationships.insert(name, view_slot);
    }
    ViewRow { columns: strip_version(row, version_column), relationships }
}

/// Wraps a pipeline root (`spec.md` §4.4). Holds the current materialized
/// rows, the state machine (`unknown → complete`, `unknown|complete →
/// error`), and the listener set notified on every externally-visible
/// change. Consecutive `unknown`-with-empty-result notifications collapse
/// into one callback invocation.
pub struct View {
    singularity: Singularity,
    pk: Vec<String>,
    version_column: String,
    order: Vec<(String, OrderDirection)>,
    rows: Vec<ViewRow>,
    state: ViewState,
    ttl_ms: u64,
    listeners: Vec<Box<dyn FnMut(&View) + Send>>,
    last_emission_was_empty_unknown: bool,
}

impl View {
    /// `order` is the query's declared sort (always PK-terminated by
    /// `zero_ast::complete`), used to position a live `add` at the row's
    /// correct place instead of appending it in arrival order.
    pub fn new(
        singularity: Singularity,
        pk: Vec<String>,
        version_column: impl Into<String>,
        order: Vec<(String, OrderDirection)>,
    ) -> Self {
        View {
            singularity,
            pk,
            version_column: version_column.into(),
            order,
            rows: Vec::new(),
            state: ViewState::Unknown,
            ttl_ms: 0,
            listeners: Vec::new(),
            last_emission_was_empty_unknown: false,
        }
    }

    pub fn data(&self) -> &[ViewRow] {
        &self.rows
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn add_listener(&mut self, cb: Box<dyn FnMut(&View) + Send>) {
        self.listeners.push(cb);
    }

    pub fn update_ttl(&mut self, ttl_ms: u64) {
        self.ttl_ms = ttl_ms;
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn destroy(&mut self) {
        self.listeners.clear();
        self.rows.clear();
    }

    fn key(&self, row: &Row) -> RowKey {
        row.key_for(&self.pk)
    }

    /// Applies one upstream change to the materialized tree, transitioning
    /// state as needed and notifying listeners.
    pub fn apply(&mut self, change: Change) -> ZeroResult<()> {
        match change {
            Change::Add { row, children } => {
                if self.singularity == Singularity::Singular && !self.rows.is_empty() {
                    return Err(internal_err("singular view received a second row"));
                }
                let view_row = view_row_from_change(row, children, &self.version_column);
                let pos = self
                    .rows
                    .partition_point(|r| cmp_with_order(&sort_key(&r.columns, &self.order), &sort_key(&view_row.columns, &self.order), &self.order).is_le());
                self.rows.insert(pos, view_row);
            }
            Change::Remove { row, .. } => {
                let key = self.key(&row);
                self.remove_by_key(&key);
            }
            Change::Edit { old, new } => {
                let key = self.key(&old);
                if let Some(view_row) = self.rows.iter_mut().find(|r| self.key_of(r) == key) {
                    view_row.columns = strip_version(new, &self.version_column);
                }
            }
            Change::Child { parent_key, relationship, change } => {
                if let Some(view_row) = self.rows.iter_mut().find(|r| r.columns.key_for(&self.pk) == parent_key) {
                    apply_child(view_row, &relationship, *change, &self.version_column)?;
                } else {
                    let _ = parent_key;
                }
            }
            Change::OutputComplete => {
                self.state = ViewState::Complete;
            }
        }
        self.notify();
        Ok(())
    }

    fn key_of(&self, row: &ViewRow) -> RowKey {
        row.columns.key_for(&self.pk)
    }

    fn remove_by_key(&mut self, key: &RowKey) {
        self.rows.retain(|r| self.key_of(r) != *key);
    }

    pub fn transition_to_error(&mut self, cause: ZeroError) {
        self.state = ViewState::Error(cause.to_string());
        self.notify();
    }

    fn notify(&mut self) {
        let is_unknown_empty = matches!(self.state, ViewState::Unknown) && self.rows.is_empty();
        if is_unknown_empty && self.last_emission_was_empty_unknown {
            return;
        }
        self.last_emission_was_empty_unknown = is_unknown_empty;
        let mut listeners = std::mem::take(&mut self.listeners);
        for cb in &mut listeners {
            cb(self);
        }
        self.listeners = listeners;
    }
}

fn apply_child(view_row: &mut ViewRow, relationship: &str, change: Change, version_column: &str) -> ZeroResult<()> {
    let slot = view_row
        .relationships
        .entry(relationship.to_string())
        .or_insert_with(|| ViewSlot::Sequence(Vec::new()));
    match (slot, change) {
        (ViewSlot::Sequence(seq), Change::Add { row, .. }) => {
            seq.push(leaf_view_row(row, version_column));
        }
        (ViewSlot::Sequence(seq), Change::Remove { row, .. }) => {
            let stripped = strip_version(row, version_column);
            seq.retain(|r| r.columns != stripped);
        }
        (ViewSlot::Sequence(seq), Change::Edit { old, new }) => {
            let old_stripped = strip_version(old, version_column);
            if let Some(r) = seq.iter_mut().find(|r| r.columns == old_stripped) {
                r.columns = strip_version(new, version_column);
            }
        }
        (ViewSlot::Singular(s), Change::Add { row, .. }) => {
            *s = Some(leaf_view_row(row, version_column));
        }
        (ViewSlot::Singular(s), Change::Remove { .. }) => {
            *s = None;
        }
        (ViewSlot::Singular(s), Change::Edit { new, .. }) => {
            if let Some(existing) = s {
                existing.columns = strip_version(new, version_column);
            }
        }
        (_, Change::Child { .. }) | (_, Change::OutputComplete) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::Value;

    fn row(id: &str, price: i64) -> Row {
        Row::from_columns([
            ("id".to_string(), Value::String(id.to_string())),
            ("price".to_string(), Value::Int(price)),
            ("_0_version".to_string(), Value::String("v1".to_string())),
        ])
    }

    #[test]
    fn add_strips_the_version_column() {
        let mut view = View::new(Singularity::Sequence, vec!["id".to_string()], "_0_version", vec![("id".to_string(), OrderDirection::Asc)]);
        view.apply(Change::Add { row: row("a", 10), children: Default::default() }).unwrap();
        assert!(view.data()[0].columns.get("_0_version").is_none());
    }

    #[test]
    fn output_complete_transitions_to_complete() {
        let mut view = View::new(Singularity::Sequence, vec!["id".to_string()], "_0_version", vec![("id".to_string(), OrderDirection::Asc)]);
        assert!(matches!(view.state(), ViewState::Unknown));
        view.apply(Change::OutputComplete).unwrap();
        assert!(matches!(view.state(), ViewState::Complete));
    }

    #[test]
    fn singular_view_rejects_a_second_row() {
        let mut view = View::new(Singularity::Singular, vec!["id".to_string()], "_0_version", vec![("id".to_string(), OrderDirection::Asc)]);
        view.apply(Change::Add { row: row("a", 10), children: Default::default() }).unwrap();
        let err = view.apply(Change::Add { row: row("b", 20), children: Default::default() }).unwrap_err();
        assert!(matches!(err, ZeroError::Invariant(_)));
    }

    #[test]
    fn consecutive_empty_unknown_notifications_collapse() {
        let mut view = View::new(Singularity::Sequence, vec!["id".to_string()], "_0_version", vec![("id".to_string(), OrderDirection::Asc)]);
        let count = std::sync::Arc::new(std::sync::Mutex::new(0));
        let count2 = count.clone();
        view.add_listener(Box::new(move |_| {
            *count2.lock().unwrap() += 1;
        }));
        // Neither of these changes the empty/unknown state, so only the
        // first notification (from construction onward) should fire once
        // further empty/unknown notifications are requested explicitly.
        view.notify();
        view.notify();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn add_inserts_at_the_declared_sort_position() {
        let mut view = View::new(
            Singularity::Sequence,
            vec!["id".to_string()],
            "_0_version",
            vec![("price".to_string(), OrderDirection::Asc)],
        );
        view.apply(Change::Add { row: row("a", 10), children: Default::default() }).unwrap();
        view.apply(Change::Add { row: row("b", 20), children: Default::default() }).unwrap();
        view.apply(Change::Add { row: row("d", 5), children: Default::default() }).unwrap();
        let ids: Vec<&str> = view.data().iter().map(|r| match r.columns.get("id") {
            Some(Value::String(s)) => s.as_str(),
            _ => panic!("expected string id"),
        }).collect();
        assert_eq!(ids, vec!["d", "a", "b"]);
    }
}
