//! Join and existence operators (`spec.md` §4.2.2, §4.2.3).

use zero_core::errors::ZeroResult;
use zero_core::{Cardinality, Row, RowKey};

use crate::change::{Change, ChildMap, ChildSlot};
use crate::scratch::Scratch;
use crate::source::{Constraint, RowSource};

/// Which side drives hydration. Per-event semantics (how `push_parent`/
/// `push_child` route and merge changes) are identical in either mode —
/// what differs is which side the pipeline builder pushes first and which
/// side is expected to be smaller (`spec.md` §4.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    Normal,
    Flipped,
}

fn correlates(correlation: &[(String, String)], parent: &Row, child: &Row) -> bool {
    correlation
        .iter()
        .all(|(p, c)| parent.get(p).is_some() && parent.get(p) == child.get(c))
}

fn child_constraint(correlation: &[(String, String)], parent: &Row) -> Constraint {
    let mut constraint = Constraint::none();
    for (p, c) in correlation {
        if let Some(v) = parent.get(p) {
            constraint = constraint.with(c.clone(), v.clone());
        }
    }
    constraint
}

fn child_slot(cardinality: Cardinality, rows: Vec<Row>) -> ChildSlot {
    match cardinality {
        Cardinality::One => ChildSlot::Singular(rows.into_iter().next()),
        Cardinality::Many => ChildSlot::Sequence(rows),
    }
}

/// Binds a parent row to a child source via a compound correlation
/// (`spec.md` §4.2.2). `matched` doubles as the operator's scratch: it
/// remembers, per currently-emitted parent row, both the parent row itself
/// (needed to test correlation against newly-arriving child rows) and the
/// child rows last attached to it (needed to emit last-known children on
/// removal).
pub struct Join {
    pub relationship: String,
    correlation: Vec<(String, String)>,
    cardinality: Cardinality,
    parent_pk: Vec<String>,
    mode: JoinMode,
    child_source: Box<dyn RowSource>,
    matched: Scratch<RowKey, (Row, Vec<Row>)>,
}

impl Join {
    pub fn new(
        relationship: impl Into<String>,
        correlation: Vec<(String, String)>,
        cardinality: Cardinality,
        parent_pk: Vec<String>,
        mode: JoinMode,
        child_source: Box<dyn RowSource>,
    ) -> Self {
        Join {
            relationship: relationship.into(),
            correlation,
            cardinality,
            parent_pk,
            mode,
            child_source,
            matched: Scratch::new(),
        }
    }

    pub fn mode(&self) -> JoinMode {
        self.mode
    }

    fn key(&self, row: &Row) -> RowKey {
        row.key_for(&self.parent_pk)
    }

    pub fn push_parent(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        match change {
            Change::Add { row, mut children } => {
                let key = self.key(&row);
                let child_rows = self.child_source.fetch(&child_constraint(&self.correlation, &row))?;
                self.matched.insert(key, (row.clone(), child_rows.clone()));
                children.insert(self.relationship.clone(), child_slot(self.cardinality, child_rows));
                Ok(vec![Change::Add { row, children }])
            }
            Change::Remove { row, mut children } => {
                let key = self.key(&row);
                if let Some((_, child_rows)) = self.matched.remove(&key) {
                    children
                        .entry(self.relationship.clone())
                        .or_insert_with(|| child_slot(self.cardinality, child_rows));
                }
                Ok(vec![Change::Remove { row, children }])
            }
            Change::Edit { old, new } => {
                let key = self.key(&old);
                let child_rows = self.child_source.fetch(&child_constraint(&self.correlation, &new))?;
                self.matched.insert(key, (new.clone(), child_rows));
                Ok(vec![Change::Edit { old, new }])
            }
            Change::Child { .. } | Change::OutputComplete => Ok(vec![change]),
        }
    }

    /// Routes a change from the child source to every currently-matched
    /// parent whose correlation matches it, wrapping it as a `Child` event.
    pub fn push_child(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        let mut out = Vec::new();
        match &change {
            Change::Add { row, .. } => {
                for (parent_key, (parent_row, children)) in self.matched.iter_mut() {
                    if correlates(&self.correlation, parent_row, row) {
                        children.push(row.clone());
                        out.push(Change::Child {
                            parent_key: parent_key.clone(),
                            relationship: self.relationship.clone(),
                            change: Box::new(change.clone()),
                        });
                    }
                }
            }
            Change::Remove { row, .. } => {
                for (parent_key, (parent_row, children)) in self.matched.iter_mut() {
                    if correlates(&self.correlation, parent_row, row) {
                        children.retain(|c| c != row);
                        out.push(Change::Child {
                            parent_key: parent_key.clone(),
                            relationship: self.relationship.clone(),
                            change: Box::new(change.clone()),
                        });
                    }
                }
            }
            Change::Edit { old, new } => {
                for (parent_key, (parent_row, children)) in self.matched.iter_mut() {
                    if correlates(&self.correlation, parent_row, old) || correlates(&self.correlation, parent_row, new) {
                        if let Some(slot) = children.iter_mut().find(|c| *c == old) {
                            *slot = new.clone();
                        }
                        out.push(Change::Child {
                            parent_key: parent_key.clone(),
                            relationship: self.relationship.clone(),
                            change: Box::new(change.clone()),
                        });
                    }
                }
            }
            Change::Child { .. } | Change::OutputComplete => {}
        }
        Ok(out)
    }

    /// Every parent key currently hydrated through this join, for the
    /// pipeline builder to consult when a two-hop refresh needs to know
    /// which parents might be affected by a junction-only mutation.
    pub fn matched_parent_keys(&self) -> impl Iterator<Item = &RowKey> {
        self.matched.keys()
    }

    /// Re-fetches `parent_key`'s children from the child source and diffs
    /// against the last-known set, emitting one `Child` event per delta.
    ///
    /// A two-hop relationship's junction table is never exposed to the view
    /// tree, so a mutation landing on the junction (or reachable only
    /// through it) has no parent-side `Add`/`Remove`/`Edit` to drive
    /// `push_parent`/`push_child` — there is no row flowing through this
    /// join that the junction mutation corresponds to. The pipeline builder
    /// instead calls this directly for every parent key whose junction rows
    /// could have changed (`spec.md` §4.2.3).
    pub fn refresh_children(&mut self, parent_key: &RowKey) -> ZeroResult<Vec<Change>> {
        let Some((parent_row, old_children)) = self.matched.get(parent_key).cloned() else {
            return Ok(vec![]);
        };
        let new_children = self.child_source.fetch(&child_constraint(&self.correlation, &parent_row))?;
        let mut out = Vec::new();
        for removed in old_children.iter().filter(|c| !new_children.contains(c)) {
            out.push(Change::Child {
                parent_key: parent_key.clone(),
                relationship: self.relationship.clone(),
                change: Box::new(Change::Remove {
                    row: removed.clone(),
                    children: ChildMap::new(),
                }),
            });
        }
        for added in new_children.iter().filter(|c| !old_children.contains(c)) {
            out.push(Change::Child {
                parent_key: parent_key.clone(),
                relationship: self.relationship.clone(),
                change: Box::new(Change::Add {
                    row: added.clone(),
                    children: ChildMap::new(),
                }),
            });
        }
        self.matched.insert(parent_key.clone(), (parent_row, new_children));
        Ok(out)
    }
}

/// An existence check realized as a join whose materialized output is
/// discarded, leaving only a boolean gate on the parent row (`spec.md`
/// §4.2.3). `matched` tracks, per currently-present parent, the parent row
/// and its current child-match count.
pub struct Existence {
    correlation: Vec<(String, String)>,
    parent_pk: Vec<String>,
    child_source: Box<dyn RowSource>,
    matched: Scratch<RowKey, (Row, usize)>,
}

impl Existence {
    pub fn new(correlation: Vec<(String, String)>, parent_pk: Vec<String>, child_source: Box<dyn RowSource>) -> Self {
        Existence {
            correlation,
            parent_pk,
            child_source,
            matched: Scratch::new(),
        }
    }

    fn key(&self, row: &Row) -> RowKey {
        row.key_for(&self.parent_pk)
    }

    fn count_for(&self, row: &Row) -> ZeroResult<usize> {
        Ok(self.child_source.fetch(&child_constraint(&self.correlation, row))?.len())
    }

    pub fn push_parent(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        match change {
            Change::Add { row, .. } => {
                let count = self.count_for(&row)?;
                let key = self.key(&row);
                self.matched.insert(key, (row.clone(), count));
                if count > 0 {
                    Ok(vec![Change::Add { row, children: ChildMap::new() }])
                } else {
                    Ok(vec![])
                }
            }
            Change::Remove { row, .. } => {
                let key = self.key(&row);
                match self.matched.remove(&key) {
                    Some((_, count)) if count > 0 => Ok(vec![Change::Remove { row, children: ChildMap::new() }]),
                    _ => Ok(vec![]),
                }
            }
            Change::Edit { old, new } => {
                let was = self
                    .matched
                    .get(&self.key(&old))
                    .map(|(_, c)| *c > 0)
                    .unwrap_or(false);
                let count = self.count_for(&new)?;
                let key = self.key(&new);
                self.matched.insert(key, (new.clone(), count));
                match (was, count > 0) {
                    (true, true) => Ok(vec![Change::Edit { old, new }]),
                    (true, false) => Ok(vec![Change::Remove { row: old, children: ChildMap::new() }]),
                    (false, true) => Ok(vec![Change::Add { row: new, children: ChildMap::new() }]),
                    (false, false) => Ok(vec![]),
                }
            }
            Change::Child { .. } | Change::OutputComplete => Ok(vec![change]),
        }
    }

    /// Re-counts `parent_key`'s matching children and emits the parent
    /// `Add`/`Remove` transition if the gate flipped, for the same
    /// junction-mutation case [`Join::refresh_children`] documents.
    pub fn refresh(&mut self, parent_key: &RowKey) -> ZeroResult<Vec<Change>> {
        let Some((parent_row, old_count)) = self.matched.get(parent_key).cloned() else {
            return Ok(vec![]);
        };
        let new_count = self.count_for(&parent_row)?;
        self.matched.insert(parent_key.clone(), (parent_row.clone(), new_count));
        match (old_count > 0, new_count > 0) {
            (false, true) => Ok(vec![Change::Add { row: parent_row, children: ChildMap::new() }]),
            (true, false) => Ok(vec![Change::Remove { row: parent_row, children: ChildMap::new() }]),
            _ => Ok(vec![]),
        }
    }

    pub fn push_child(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        let mut out = Vec::new();
        let (affecting_row, delta): (&Row, i64) = match &change {
            Change::Add { row, .. } => (row, 1),
            Change::Remove { row, .. } => (row, -1),
            Change::Edit { .. } | Change::Child { .. } | Change::OutputComplete => return Ok(out),
        };
        let mut transitions = Vec::new();
        for (key, (parent_row, count)) in self.matched.iter_mut() {
            if correlates(&self.correlation, parent_row, affecting_row) {
                let was = *count > 0;
                *count = (*count as i64 + delta).max(0) as usize;
                let now = *count > 0;
                if was != now {
                    transitions.push((key.clone(), parent_row.clone(), now));
                }
            }
        }
        for (_, row, now_present) in transitions {
            if now_present {
                out.push(Change::Add { row, children: ChildMap::new() });
            } else {
                out.push(Change::Remove { row, children: ChildMap::new() });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::Value;

    struct StaticSource(Vec<Row>);
    impl RowSource for StaticSource {
        fn fetch(&self, constraint: &Constraint) -> ZeroResult<Vec<Row>> {
            Ok(self.0.iter().filter(|r| constraint.matches(r)).cloned().collect())
        }
    }

    fn user(id: &str, name: &str) -> Row {
        Row::from_columns([
            ("id".to_string(), Value::String(id.to_string())),
            ("name".to_string(), Value::String(name.to_string())),
        ])
    }

    fn issue(id: &str, owner: &str) -> Row {
        Row::from_columns([
            ("id".to_string(), Value::String(id.to_string())),
            ("ownerId".to_string(), Value::String(owner.to_string())),
        ])
    }

    #[test]
    fn join_attaches_matching_child_as_singular() {
        let source = Box::new(StaticSource(vec![user("u1", "Alice")]));
        let mut join = Join::new(
            "owner",
            vec![("ownerId".to_string(), "id".to_string())],
            Cardinality::One,
            vec!["id".to_string()],
            JoinMode::Normal,
            source,
        );
        let out = join
            .push_parent(Change::Add { row: issue("i1", "u1"), children: Default::default() })
            .unwrap();
        match &out[0] {
            Change::Add { children, .. } => {
                assert_eq!(children.get("owner"), Some(&ChildSlot::Singular(Some(user("u1", "Alice")))));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn join_child_push_emits_child_event_for_matched_parent() {
        let source = Box::new(StaticSource(vec![user("u1", "Alice")]));
        let mut join = Join::new(
            "owner",
            vec![("ownerId".to_string(), "id".to_string())],
            Cardinality::One,
            vec!["id".to_string()],
            JoinMode::Normal,
            source,
        );
        join.push_parent(Change::Add { row: issue("i1", "u1"), children: Default::default() })
            .unwrap();
        let out = join
            .push_child(Change::Edit { old: user("u1", "Alice"), new: user("u1", "Bob") })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Change::Child { .. }));
    }

    #[test]
    fn existence_gates_parent_on_child_presence() {
        let source = Box::new(StaticSource(vec![]));
        let mut exists = Existence::new(
            vec![("id".to_string(), "issueId".to_string())],
            vec!["id".to_string()],
            source,
        );
        let out = exists
            .push_parent(Change::Add { row: issue("i1", "u1"), children: Default::default() })
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn existence_child_add_flips_parent_to_present() {
        let source = Box::new(StaticSource(vec![]));
        let mut exists = Existence::new(
            vec![("id".to_string(), "issueId".to_string())],
            vec!["id".to_string()],
            source,
        );
        exists
            .push_parent(Change::Add { row: issue("i1", "u1"), children: Default::default() })
            .unwrap();
        let comment = Row::from_columns([("issueId".to_string(), Value::String("i1".to_string()))]);
        let out = exists.push_child(Change::Add { row: comment, children: Default::default() }).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Change::Add { .. }));
    }

    struct SharedSource(std::sync::Arc<std::sync::Mutex<Vec<Row>>>);
    impl RowSource for SharedSource {
        fn fetch(&self, constraint: &Constraint) -> ZeroResult<Vec<Row>> {
            Ok(self.0.lock().unwrap().iter().filter(|r| constraint.matches(r)).cloned().collect())
        }
    }

    #[test]
    fn refresh_children_diffs_against_last_known_set() {
        let source = std::sync::Arc::new(std::sync::Mutex::new(vec![user("u1", "Alice")]));
        let mut join = Join::new(
            "labels",
            vec![("id".to_string(), "id".to_string())],
            Cardinality::Many,
            vec!["id".to_string()],
            JoinMode::Normal,
            Box::new(SharedSource(source.clone())),
        );
        join.push_parent(Change::Add {
            row: issue("u1", "u1"),
            children: Default::default(),
        })
        .unwrap();

        // A mutation lands on the junction table, adding a second linked row
        // with no corresponding parent-side event.
        source.lock().unwrap().push(user("u1", "Bob"));
        let parent_key = RowKey::new(vec![Value::String("u1".to_string())]);
        let out = join.refresh_children(&parent_key).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            Change::Child { change: ref c, .. } if matches!(**c, Change::Add { .. })
        ));

        // Refreshing again with no further change yields nothing.
        assert!(join.refresh_children(&parent_key).unwrap().is_empty());
    }

    #[test]
    fn existence_refresh_flips_the_gate_on_junction_only_change() {
        let source = std::sync::Arc::new(std::sync::Mutex::new(vec![]));
        let mut exists = Existence::new(
            vec![("id".to_string(), "issueId".to_string())],
            vec!["id".to_string()],
            Box::new(SharedSource(source.clone())),
        );
        exists
            .push_parent(Change::Add { row: issue("i1", "u1"), children: Default::default() })
            .unwrap();
        let parent_key = RowKey::new(vec![Value::String("i1".to_string())]);
        assert!(exists.refresh(&parent_key).unwrap().is_empty());

        source.lock().unwrap().push(Row::from_columns([(
            "issueId".to_string(),
            Value::String("i1".to_string()),
        )]));
        let out = exists.refresh(&parent_key).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Change::Add { .. }));
    }
}
