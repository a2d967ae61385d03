//! Row-addressable table storage (`spec.md` §4.1 "C1"): the leaf of every
//! pipeline, fed by the replicator and pulled from by sources/joins.

use std::collections::BTreeMap;

use tokio::sync::broadcast;
use zero_core::errors::{internal_err, ZeroError, ZeroResult};
use zero_core::{ReplicaVersion, Row, RowKey, TableSpec};

use crate::source::{cmp_with_order, sort_key, Constraint, OrderDirection, RowSource};

/// One mutation to a table's row set, as applied by `push` (`spec.md` §4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Add(Row),
    Remove(RowKey),
    Edit(Row, Row),
}

/// A committed mutation as delivered to a `connect()` subscriber: the
/// version it was stamped with, plus the change itself.
#[derive(Debug, Clone)]
pub struct Commit {
    pub version: ReplicaVersion,
    pub change: RowChange,
}

/// The row-addressable store for a single table. Ordered primary-key
/// iteration is a base requirement (Filter/Join/OrderBy all rely on PK
/// tie-breaking), so rows live in a `BTreeMap<RowKey, Row>`; `fetch` filters
/// that map by an equality `Constraint` and, if a non-default order is
/// requested, sorts the filtered result in place. This is a simplification
/// of "any other order must be supported by an index" (`spec.md` §4.1):
/// rather than maintaining a secondary index per requested order, ordering
/// other than the primary key is served by sorting the (already filtered,
/// necessarily bounded) result set — acceptable because fetches in this
/// system are always scoped to a single client query's correlation, never
/// unconstrained full-table scans.
pub struct TableStore {
    spec: TableSpec,
    rows: BTreeMap<RowKey, Row>,
    version: ReplicaVersion,
    commits: broadcast::Sender<Commit>,
}

impl TableStore {
    pub fn new(spec: TableSpec) -> Self {
        let (commits, _) = broadcast::channel(1024);
        TableStore {
            spec,
            rows: BTreeMap::new(),
            version: ReplicaVersion::zero(),
            commits,
        }
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn version(&self) -> &ReplicaVersion {
        &self.version
    }

    fn key(&self, row: &Row) -> RowKey {
        row.key_for(&self.spec.primary_key)
    }

    /// Applies one change atomically with respect to observers: the row map
    /// is updated and the version advanced before the commit is broadcast,
    /// so no subscriber can observe the new version without the matching row
    /// state (`spec.md` §4.1 "push is atomic vs observers").
    pub fn push(&mut self, change: RowChange, version: ReplicaVersion) -> ZeroResult<()> {
        if !version.is_advance_from(&self.version) {
            return Err(internal_err(format!(
                "table {}: replica version {} does not advance from {}",
                self.spec.name, version, self.version
            )));
        }
        match &change {
            RowChange::Add(row) => {
                self.validate_row(row)?;
                let key = self.key(row);
                if self.rows.contains_key(&key) {
                    return Err(ZeroError::PrimaryKeyViolation {
                        table: self.spec.name.clone(),
                        key: key.to_string(),
                    });
                }
                self.rows.insert(key, row.clone());
            }
            RowChange::Remove(key) => {
                if self.rows.remove(key).is_none() {
                    return Err(ZeroError::NotFound {
                        table: self.spec.name.clone(),
                        key: key.to_string(),
                    });
                }
            }
            RowChange::Edit(old, new) => {
                self.validate_row(new)?;
                let key = self.key(old);
                if self.key(new) != key {
                    return Err(internal_err(
                        "edit changed the primary key; push Remove+Add instead",
                    ));
                }
                if !self.rows.contains_key(&key) {
                    return Err(ZeroError::NotFound {
                        table: self.spec.name.clone(),
                        key: key.to_string(),
                    });
                }
                self.rows.insert(key, new.clone());
            }
        }
        self.version = version.clone();
        let _ = self.commits.send(Commit { version, change });
        Ok(())
    }

    fn validate_row(&self, row: &Row) -> ZeroResult<()> {
        for column in row.column_names() {
            if !self.spec.has_column(column) {
                return Err(ZeroError::SchemaMismatch {
                    table: self.spec.name.clone(),
                    column: column.clone(),
                    expected: "declared column".into(),
                    actual: "unknown column".into(),
                });
            }
        }
        Ok(())
    }

    /// Lazily-ordered fetch. Defaults to primary-key ascending; an explicit
    /// `order` sorts the (already constraint-filtered) result.
    pub fn fetch_ordered(
        &self,
        constraint: &Constraint,
        order: Option<&[(String, OrderDirection)]>,
    ) -> ZeroResult<Vec<Row>> {
        let mut out: Vec<Row> = self
            .rows
            .values()
            .filter(|r| constraint.matches(r))
            .cloned()
            .collect();
        if let Some(order) = order {
            out.sort_by(|a, b| cmp_with_order(&sort_key(a, order), &sort_key(b, order), order));
        }
        Ok(out)
    }

    /// Subscribes to commits after the current version (`spec.md` §4.1
    /// "connect"). Handing back a fresh receiver means the subscriber only
    /// observes commits from this point forward, matching the "after a
    /// given replica version" framing at the point of subscription.
    pub fn connect(&self) -> broadcast::Receiver<Commit> {
        self.commits.subscribe()
    }
}

impl RowSource for TableStore {
    fn fetch(&self, constraint: &Constraint) -> ZeroResult<Vec<Row>> {
        self.fetch_ordered(constraint, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::{ColumnKind, ColumnSpec, Value};

    fn item_table() -> TableSpec {
        TableSpec {
            name: "item".into(),
            columns: vec![
                ColumnSpec { name: "id".into(), kind: ColumnKind::String },
                ColumnSpec { name: "price".into(), kind: ColumnKind::Int64 },
                ColumnSpec { name: "_0_version".into(), kind: ColumnKind::String },
            ],
            primary_key: vec!["id".into()],
            unique_keys: vec![],
            zero_version_column: "_0_version".into(),
        }
    }

    fn row(id: &str, price: i64) -> Row {
        Row::from_columns([
            ("id".to_string(), Value::String(id.to_string())),
            ("price".to_string(), Value::Int(price)),
            ("_0_version".to_string(), Value::String("v1".to_string())),
        ])
    }

    #[test]
    fn duplicate_add_is_a_primary_key_violation() {
        let mut store = TableStore::new(item_table());
        store.push(RowChange::Add(row("a", 10)), ReplicaVersion::new("1")).unwrap();
        let err = store
            .push(RowChange::Add(row("a", 20)), ReplicaVersion::new("2"))
            .unwrap_err();
        assert!(matches!(err, ZeroError::PrimaryKeyViolation { .. }));
    }

    #[test]
    fn remove_of_absent_key_is_not_found() {
        let mut store = TableStore::new(item_table());
        let key = row("a", 10).key_for(&["id".to_string()]);
        let err = store.push(RowChange::Remove(key), ReplicaVersion::new("1")).unwrap_err();
        assert!(matches!(err, ZeroError::NotFound { .. }));
    }

    #[test]
    fn fetch_defaults_to_primary_key_order() {
        let mut store = TableStore::new(item_table());
        store.push(RowChange::Add(row("b", 20)), ReplicaVersion::new("1")).unwrap();
        store.push(RowChange::Add(row("a", 10)), ReplicaVersion::new("2")).unwrap();
        let rows = store.fetch_ordered(&Constraint::none(), None).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.get("id").cloned().unwrap()).collect();
        assert_eq!(ids, vec![Value::String("a".into()), Value::String("b".into())]);
    }

    #[test]
    fn fetch_honors_explicit_order() {
        let mut store = TableStore::new(item_table());
        store.push(RowChange::Add(row("a", 10)), ReplicaVersion::new("1")).unwrap();
        store.push(RowChange::Add(row("b", 30)), ReplicaVersion::new("2")).unwrap();
        store.push(RowChange::Add(row("c", 20)), ReplicaVersion::new("3")).unwrap();
        let rows = store
            .fetch_ordered(&Constraint::none(), Some(&[("price".to_string(), OrderDirection::Desc)]))
            .unwrap();
        let prices: Vec<_> = rows.iter().map(|r| r.get("price").cloned().unwrap()).collect();
        assert_eq!(prices, vec![Value::Int(30), Value::Int(20), Value::Int(10)]);
    }
}
