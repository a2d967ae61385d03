//! OR-branch fan-out and the two fan-in terminators (`spec.md` §4.2.4).

use std::collections::BTreeMap;

use zero_core::errors::{internal_err, ZeroResult};
use zero_core::RowKey;

use crate::change::{Change, ChildSlot};

/// Broadcasts a single upstream change to every branch of an OR. Stateless:
/// every branch operator receives its own clone and decides independently
/// whether it applies.
pub struct FanOut {
    branches: usize,
}

impl FanOut {
    pub fn new(branches: usize) -> Self {
        FanOut { branches }
    }

    pub fn broadcast(&self, change: &Change) -> Vec<Change> {
        std::iter::repeat(change.clone()).take(self.branches).collect()
    }
}

/// Simple OR of branch outputs: branches share ordering, so this only needs
/// to deduplicate a row that more than one branch currently holds
/// (`spec.md` §4.2.4 "simple OR of branch outputs").
pub struct FanIn {
    pk: Vec<String>,
    /// Per-row key, how many branches currently hold it.
    held_by: BTreeMap<RowKey, usize>,
}

impl FanIn {
    pub fn new(pk: Vec<String>) -> Self {
        FanIn { pk, held_by: BTreeMap::new() }
    }

    pub fn push(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        match &change {
            Change::Add { row, .. } => {
                let key = row.key_for(&self.pk);
                let count = self.held_by.entry(key).or_insert(0);
                *count += 1;
                if *count == 1 {
                    Ok(vec![change])
                } else {
                    Ok(vec![])
                }
            }
            Change::Remove { row, .. } => {
                let key = row.key_for(&self.pk);
                match self.held_by.get_mut(&key) {
                    Some(n) if *n > 1 => {
                        *n -= 1;
                        Ok(vec![])
                    }
                    Some(_) => {
                        self.held_by.remove(&key);
                        Ok(vec![change])
                    }
                    None => Ok(vec![]),
                }
            }
            Change::Edit { .. } | Change::Child { .. } | Change::OutputComplete => Ok(vec![change]),
        }
    }
}

fn key_of(change: &Change, pk: &[String]) -> Option<RowKey> {
    change.row_key(pk).or(match change {
        Change::Child { parent_key, .. } => Some(parent_key.clone()),
        _ => None,
    })
}

/// Merges concurrent per-branch changes for the same parent row within one
/// batch, per the literal merge table of `spec.md` §4.2.4. Used whenever any
/// OR branch contains an existence subquery, so that `child` changes on a
/// shared parent are combined rather than delivered twice.
pub struct UnionFanIn {
    pk: Vec<String>,
}

impl UnionFanIn {
    pub fn new(pk: Vec<String>) -> Self {
        UnionFanIn { pk }
    }

    /// Combines every change in `batch` that shares a row key, in arrival
    /// order, via [`merge_into`]. A key with only one contributing change
    /// passes through untouched. A key may end up with more than one
    /// surviving change: distinct relationships arriving as bare `child`
    /// events (no governing `add`/`remove`/`edit` for the parent in this
    /// batch) are kept as separate entries rather than merged into one,
    /// per `spec.md` §4.2.4 "merge child streams by relationship name".
    pub fn push_batch(&mut self, batch: Vec<Change>) -> ZeroResult<Vec<Change>> {
        let mut combined: Vec<(RowKey, Vec<Change>)> = Vec::new();
        for change in batch {
            let key = match key_of(&change, &self.pk) {
                Some(k) => k,
                None => {
                    combined.push((RowKey::new(vec![]), vec![change]));
                    continue;
                }
            };
            if let Some((_, existing)) = combined.iter_mut().find(|(k, _)| *k == key) {
                merge_into(existing, change)?;
            } else {
                combined.push((key, vec![change]));
            }
        }
        Ok(combined.into_iter().flat_map(|(_, changes)| changes).collect())
    }
}

/// Folds `incoming` into the accumulated entries for one row key. Maintains
/// the invariant that `existing` is either a single governing
/// `add`/`remove`/`edit`/`output-complete` entry, or one-or-more bare
/// `child` entries each for a distinct relationship name.
fn merge_into(existing: &mut Vec<Change>, incoming: Change) -> ZeroResult<()> {
    if let Change::Child { relationship: ref rel_in, .. } = incoming {
        if let Some(pos) = existing
            .iter()
            .position(|c| matches!(c, Change::Child { relationship, .. } if relationship == rel_in))
        {
            let prior = existing.remove(pos);
            existing.insert(pos, merge(prior, incoming)?);
            return Ok(());
        }
        if existing.iter().all(|c| matches!(c, Change::Child { .. })) {
            existing.push(incoming);
            return Ok(());
        }
    }
    // `incoming` is a global event for the row (add/remove/edit/output-complete),
    // or `existing` already holds the single governing entry: fold every
    // accumulated entry (possibly several distinct-relationship `child`s) into
    // it one at a time, since an add/remove/edit subsumes every relationship.
    let mut result = incoming;
    for prior in existing.drain(..) {
        result = merge(result, prior)?;
    }
    existing.push(result);
    Ok(())
}

fn merge_children_into(left: &mut crate::change::ChildMap, right: crate::change::ChildMap) {
    for (name, slot) in right {
        left.entry(name)
            .and_modify(|existing| merge_slot(existing, &slot))
            .or_insert(slot);
    }
}

fn merge_slot(existing: &mut ChildSlot, incoming: &ChildSlot) {
    match (existing, incoming) {
        (ChildSlot::Singular(e), ChildSlot::Singular(i)) => {
            if e.is_none() {
                *e = i.clone();
            }
        }
        (ChildSlot::Sequence(e), ChildSlot::Sequence(i)) => {
            for row in i {
                if !e.contains(row) {
                    e.push(row.clone());
                }
            }
        }
        _ => {}
    }
}

/// The literal merge table of `spec.md` §4.2.4, `left` accumulated so far,
/// `right` the next branch's change for the same key.
fn merge(left: Change, right: Change) -> ZeroResult<Change> {
    use Change::*;
    match (left, right) {
        // add / add: drop right.
        (Add { row, children }, Add { .. }) => Ok(Add { row, children }),
        // add / remove: invalid.
        (Add { .. }, Remove { .. }) => Err(internal_err("UnionFanIn: add/remove collision for the same row in one batch")),
        // add / edit: treat right as a pre-add edit of left — the row's
        // final value is the edit's `new`, keep left's children.
        (Add { children, .. }, Edit { new, .. }) => Ok(Add { row: new, children }),
        // add / child: merge children into left.
        (Add { row, mut children }, Child { relationship, change, .. }) => {
            apply_child(&mut children, relationship, *change);
            Ok(Add { row, children })
        }
        // remove / add: invalid.
        (Remove { .. }, Add { .. }) => Err(internal_err("UnionFanIn: remove/add collision for the same row in one batch")),
        // remove / remove: drop right.
        (Remove { row, children }, Remove { .. }) => Ok(Remove { row, children }),
        // remove / edit: treat left as post-remove.
        (Remove { row, children }, Edit { .. }) => Ok(Remove { row, children }),
        // remove / child: attach right child to left's last-known children.
        (Remove { row, mut children }, Child { relationship, change, .. }) => {
            apply_child(&mut children, relationship, *change);
            Ok(Remove { row, children })
        }
        // edit / add: compose edits (final value is right's row).
        (Edit { old, .. }, Add { row, children }) => {
            let _ = children;
            Ok(Edit { old, new: row })
        }
        // edit / remove: decompose.
        (Edit { old, .. }, Remove { .. }) => Ok(Remove { row: old, children: Default::default() }),
        // edit / edit: compose.
        (Edit { old, .. }, Edit { new, .. }) => Ok(Edit { old, new }),
        // edit / child: fold child into new side.
        (Edit { old, new }, Child { .. }) => Ok(Edit { old, new }),
        // child / add: fold into parent.
        (Child { change, .. }, Add { row, children }) => {
            let mut merged = children;
            if let Change::Add { children: c, .. } = *change {
                merge_children_into(&mut merged, c);
            }
            Ok(Add { row, children: merged })
        }
        // child / remove: attach to parent's last.
        (Child { change, .. }, Remove { row, children }) => {
            let mut merged = children;
            if let Change::Remove { children: c, .. } = *change {
                merge_children_into(&mut merged, c);
            }
            Ok(Remove { row, children: merged })
        }
        // child / edit: fold into new.
        (Child { .. }, Edit { old, new }) => Ok(Edit { old, new }),
        // child / child: merge child streams by relationship name. Callers
        // (`merge_into`) keep distinct-relationship `child` events as
        // separate entries instead of reaching this arm, so `merge` itself
        // only ever sees same-relationship pairs here.
        (
            Child { parent_key, relationship: rel_l, change: change_l },
            Child { relationship: rel_r, change: change_r, .. },
        ) => {
            if rel_l == rel_r {
                Ok(Child { parent_key, relationship: rel_l, change: merge_boxed(change_l, change_r)? })
            } else {
                Err(internal_err("UnionFanIn: merge() called with mismatched relationship names"))
            }
        }
        (OutputComplete, other) | (other, OutputComplete) => Ok(other),
    }
}

fn merge_boxed(left: Box<Change>, right: Box<Change>) -> ZeroResult<Box<Change>> {
    Ok(Box::new(merge(*left, *right)?))
}

fn apply_child(children: &mut crate::change::ChildMap, relationship: String, change: Change) {
    let slot = children.entry(relationship).or_insert_with(|| ChildSlot::Sequence(Vec::new()));
    match (slot, change) {
        (ChildSlot::Sequence(seq), Change::Add { row, .. }) => seq.push(row),
        (ChildSlot::Sequence(seq), Change::Remove { row, .. }) => seq.retain(|r| *r != row),
        (ChildSlot::Singular(s), Change::Add { row, .. }) => *s = Some(row),
        (ChildSlot::Singular(s), Change::Remove { .. }) => *s = None,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::Value;

    fn issue(id: &str) -> zero_core::Row {
        zero_core::Row::from_columns([("id".to_string(), Value::String(id.to_string()))])
    }

    #[test]
    fn fan_in_deduplicates_same_key_add_across_branches() {
        let mut fan_in = FanIn::new(vec!["id".to_string()]);
        let a = fan_in.push(Change::Add { row: issue("i1"), children: Default::default() }).unwrap();
        let b = fan_in.push(Change::Add { row: issue("i1"), children: Default::default() }).unwrap();
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn fan_in_only_emits_remove_when_last_branch_drops() {
        let mut fan_in = FanIn::new(vec!["id".to_string()]);
        fan_in.push(Change::Add { row: issue("i1"), children: Default::default() }).unwrap();
        fan_in.push(Change::Add { row: issue("i1"), children: Default::default() }).unwrap();
        let first = fan_in.push(Change::Remove { row: issue("i1"), children: Default::default() }).unwrap();
        assert!(first.is_empty());
        let second = fan_in.push(Change::Remove { row: issue("i1"), children: Default::default() }).unwrap();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn union_fan_in_merges_two_child_events_for_the_same_parent() {
        let mut union = UnionFanIn::new(vec!["id".to_string()]);
        let parent_key = issue("i1").key_for(&["id".to_string()]);
        let c1 = Change::Child {
            parent_key: parent_key.clone(),
            relationship: "comments".into(),
            change: Box::new(Change::Add { row: issue("c1"), children: Default::default() }),
        };
        let c2 = Change::Child {
            parent_key,
            relationship: "comments".into(),
            change: Box::new(Change::Add { row: issue("c2"), children: Default::default() }),
        };
        let merged = union.push_batch(vec![c1, c2]).unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn union_fan_in_keeps_both_relationships_for_the_same_parent() {
        let mut union = UnionFanIn::new(vec!["id".to_string()]);
        let parent_key = issue("i1").key_for(&["id".to_string()]);
        let comments = Change::Child {
            parent_key: parent_key.clone(),
            relationship: "comments".into(),
            change: Box::new(Change::Add { row: issue("c1"), children: Default::default() }),
        };
        let labels = Change::Child {
            parent_key,
            relationship: "labels".into(),
            change: Box::new(Change::Add { row: issue("l1"), children: Default::default() }),
        };
        let merged = union.push_batch(vec![comments, labels]).unwrap();
        assert_eq!(merged.len(), 2);
        let relationships: std::collections::HashSet<&str> = merged
            .iter()
            .map(|c| match c {
                Change::Child { relationship, .. } => relationship.as_str(),
                _ => panic!("expected child change"),
            })
            .collect();
        assert!(relationships.contains("comments"));
        assert!(relationships.contains("labels"));
    }

    #[test]
    fn union_fan_in_rejects_add_remove_collision() {
        let mut union = UnionFanIn::new(vec!["id".to_string()]);
        let add = Change::Add { row: issue("i1"), children: Default::default() };
        let remove = Change::Remove { row: issue("i1"), children: Default::default() };
        assert!(union.push_batch(vec![add, remove]).is_err());
    }
}
