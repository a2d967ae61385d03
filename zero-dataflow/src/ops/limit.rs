//! Windowed limit maintenance (`spec.md` §4.2.5).

use zero_core::{RowKey, ZeroResult};

use crate::change::Change;
use crate::source::{cmp_with_order, sort_key, OrderDirection};

/// Maintains every row it has ever seen, sorted by `order`, so that a
/// deletion inside the first `n` positions can be backfilled from the row
/// that was sitting just past the boundary (`spec.md` §4.2.5 "deletions
/// within the window pull from the tail if available") without needing to
/// re-fetch from upstream.
pub struct Limit {
    n: u64,
    order: Vec<(String, OrderDirection)>,
    pk: Vec<String>,
    seen: Vec<zero_core::Row>,
}

impl Limit {
    pub fn new(n: u64, order: Vec<(String, OrderDirection)>, pk: Vec<String>) -> Self {
        Limit { n, order, pk, seen: Vec::new() }
    }

    fn key(&self, row: &zero_core::Row) -> RowKey {
        row.key_for(&self.pk)
    }

    fn window(&self) -> &[zero_core::Row] {
        let end = (self.n as usize).min(self.seen.len());
        &self.seen[..end]
    }

    fn insertion_index(&self, row: &zero_core::Row) -> usize {
        let key = sort_key(row, &self.order);
        self.seen
            .partition_point(|r| cmp_with_order(&sort_key(r, &self.order), &key, &self.order) != std::cmp::Ordering::Greater)
    }

    fn diff(&self, old_window: &[zero_core::Row], new_window: &[zero_core::Row]) -> Vec<Change> {
        let old_keys: Vec<RowKey> = old_window.iter().map(|r| self.key(r)).collect();
        let new_keys: Vec<RowKey> = new_window.iter().map(|r| self.key(r)).collect();
        let mut out = Vec::new();
        for (row, key) in old_window.iter().zip(&old_keys) {
            if !new_keys.contains(key) {
                out.push(Change::Remove { row: row.clone(), children: Default::default() });
            }
        }
        for (row, key) in new_window.iter().zip(&new_keys) {
            if !old_keys.contains(key) {
                out.push(Change::Add { row: row.clone(), children: Default::default() });
            }
        }
        out
    }

    pub fn push(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        match change {
            Change::Add { row, .. } => {
                let old_window: Vec<_> = self.window().to_vec();
                let pos = self.insertion_index(&row);
                self.seen.insert(pos, row);
                let new_window: Vec<_> = self.window().to_vec();
                Ok(self.diff(&old_window, &new_window))
            }
            Change::Remove { row, .. } => {
                let old_window: Vec<_> = self.window().to_vec();
                let key = self.key(&row);
                if let Some(idx) = self.seen.iter().position(|r| self.key(r) == key) {
                    self.seen.remove(idx);
                }
                let new_window: Vec<_> = self.window().to_vec();
                Ok(self.diff(&old_window, &new_window))
            }
            Change::Edit { old, new } => {
                let old_window: Vec<_> = self.window().to_vec();
                let key = self.key(&old);
                if let Some(idx) = self.seen.iter().position(|r| self.key(r) == key) {
                    self.seen.remove(idx);
                }
                let pos = self.insertion_index(&new);
                self.seen.insert(pos, new);
                let new_window: Vec<_> = self.window().to_vec();
                Ok(self.diff(&old_window, &new_window))
            }
            Change::Child { ref parent_key, .. } => {
                if self.window().iter().any(|r| self.key(r) == *parent_key) {
                    Ok(vec![change])
                } else {
                    Ok(vec![])
                }
            }
            Change::OutputComplete => Ok(vec![change]),
        }
    }

}
