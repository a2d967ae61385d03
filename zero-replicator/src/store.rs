//! The replicated row store a [`crate::Replicator`] commits into: one
//! [`TableStore`] per schema table, validated and applied as a unit per
//! transaction (`spec.md` §4.7 guarantee (i): "readers never observe partial
//! transactions").

use std::collections::HashMap;

use zero_core::errors::ZeroResult;
use zero_core::{ReplicaVersion, Schema, ZeroError};
use zero_dataflow::storage::{RowChange, TableStore};

use crate::transaction::{Mutation, ReplicationTransaction};

/// Owns every table's [`TableStore`], keyed by table name. A single
/// replicator actor is the only writer (`spec.md` §5 "writers are
/// serialized by a single replicator actor"); readers (pipelines, via
/// `zero-pipeline`'s `SourceFactory`) pull from the same stores concurrently.
pub struct ReplicaStore {
    schema: Schema,
    tables: HashMap<String, TableStore>,
}

impl ReplicaStore {
    pub fn new(schema: Schema) -> Self {
        let tables = schema
            .tables
            .values()
            .map(|t| (t.name.clone(), TableStore::new(t.clone())))
            .collect();
        ReplicaStore { schema, tables }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn table(&self, name: &str) -> ZeroResult<&TableStore> {
        self.tables
            .get(name)
            .ok_or_else(|| ZeroError::internal(format!("unknown table {name}")))
    }

    pub fn table_mut(&mut self, name: &str) -> ZeroResult<&mut TableStore> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| ZeroError::internal(format!("unknown table {name}")))
    }

    /// The highest version committed across every table store. Tables
    /// untouched by recent transactions lag behind; this is the watermark a
    /// fresh replicator run resumes replaying from.
    pub fn current_version(&self) -> ReplicaVersion {
        self.tables
            .values()
            .map(|t| t.version().clone())
            .max()
            .unwrap_or_else(ReplicaVersion::zero)
    }

    /// Validates every mutation in `tx` against schema shape and current row
    /// presence *before* applying any of them, so that a transaction either
    /// fully commits or is rejected outright with no partial effect — the
    /// two-phase shape `spec.md` §4.7's atomicity guarantee requires given
    /// that each table's store is independently locked.
    ///
    /// A validation failure here is reported as [`ZeroError::SchemaDrift`]:
    /// per `spec.md` §7, any change incompatible with the current schema
    /// halts replication rather than being silently dropped or partially
    /// applied.
    fn validate(&self, tx: &ReplicationTransaction) -> ZeroResult<()> {
        for mutation in &tx.mutations {
            let table = self.table(mutation.table()).map_err(|_| {
                ZeroError::SchemaDrift(format!("transaction references unknown table {}", mutation.table()))
            })?;
            match mutation {
                Mutation::Add { row, .. } => {
                    for column in row.column_names() {
                        if !table.spec().has_column(column) {
                            return Err(ZeroError::SchemaDrift(format!(
                                "table {} has no column {column}",
                                table.spec().name
                            )));
                        }
                    }
                    let key = row.key_for(&table.spec().primary_key);
                    if table.fetch_ordered(&Default::default(), None)?.iter().any(|r| {
                        r.key_for(&table.spec().primary_key) == key
                    }) {
                        return Err(ZeroError::internal(format!(
                            "transaction adds an already-present key in table {}",
                            table.spec().name
                        )));
                    }
                }
                Mutation::Remove { key, .. } => {
                    let present = table.fetch_ordered(&Default::default(), None)?.iter().any(|r| {
                        r.key_for(&table.spec().primary_key) == *key
                    });
                    if !present {
                        return Err(ZeroError::internal(format!(
                            "transaction removes an absent key in table {}",
                            table.spec().name
                        )));
                    }
                }
                Mutation::Edit { old, new, .. } => {
                    for column in new.column_names() {
                        if !table.spec().has_column(column) {
                            return Err(ZeroError::SchemaDrift(format!(
                                "table {} has no column {column}",
                                table.spec().name
                            )));
                        }
                    }
                    let key = old.key_for(&table.spec().primary_key);
                    if new.key_for(&table.spec().primary_key) != key {
                        return Err(ZeroError::internal(
                            "edit changed the primary key; split into remove+add upstream",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies `tx` atomically: validates every mutation first, then applies
    /// each one in arrival order, stamping every touched table with `tx`'s
    /// version (`spec.md` §4.7 "begin; apply mutations in arrival order;
    /// write the version; commit").
    pub fn apply_transaction(&mut self, tx: &ReplicationTransaction) -> ZeroResult<()> {
        self.validate(tx)?;
        for mutation in &tx.mutations {
            let table = self.table_mut(mutation.table())?;
            let change = match mutation.clone() {
                Mutation::Add { row, .. } => RowChange::Add(row),
                Mutation::Remove { key, .. } => RowChange::Remove(key),
                Mutation::Edit { old, new, .. } => RowChange::Edit(old, new),
            };
            table.push(change, tx.version.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::{Cardinality, ColumnKind, ColumnSpec, Row, TableSpec, Value};

    fn schema() -> Schema {
        let item = TableSpec {
            name: "item".into(),
            columns: vec![
                ColumnSpec { name: "id".into(), kind: ColumnKind::String },
                ColumnSpec { name: "price".into(), kind: ColumnKind::Int64 },
                ColumnSpec { name: "_0_version".into(), kind: ColumnKind::String },
            ],
            primary_key: vec!["id".into()],
            unique_keys: vec![],
            zero_version_column: "_0_version".into(),
        };
        let _ = Cardinality::One;
        Schema { tables: [(item.name.clone(), item)].into_iter().collect(), relationships: vec![] }
    }

    fn row(id: &str, price: i64) -> Row {
        Row::from_columns([
            ("id".to_string(), Value::String(id.to_string())),
            ("price".to_string(), Value::Int(price)),
        ])
    }

    #[test]
    fn applies_add_and_advances_version() {
        let mut store = ReplicaStore::new(schema());
        let tx = ReplicationTransaction::new(
            ReplicaVersion::new("1"),
            vec![Mutation::Add { table: "item".into(), row: row("a", 10) }],
        );
        store.apply_transaction(&tx).unwrap();
        assert_eq!(store.current_version(), ReplicaVersion::new("1"));
        assert_eq!(store.table("item").unwrap().fetch_ordered(&Default::default(), None).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_add_is_rejected_without_partial_application() {
        let mut store = ReplicaStore::new(schema());
        let tx1 = ReplicationTransaction::new(
            ReplicaVersion::new("1"),
            vec![Mutation::Add { table: "item".into(), row: row("a", 10) }],
        );
        store.apply_transaction(&tx1).unwrap();

        let tx2 = ReplicationTransaction::new(
            ReplicaVersion::new("2"),
            vec![
                Mutation::Add { table: "item".into(), row: row("b", 20) },
                Mutation::Add { table: "item".into(), row: row("a", 99) },
            ],
        );
        assert!(store.apply_transaction(&tx2).is_err());
        // Neither mutation of the rejected transaction applied: "b" absent.
        assert_eq!(store.table("item").unwrap().fetch_ordered(&Default::default(), None).unwrap().len(), 1);
        assert_eq!(store.current_version(), ReplicaVersion::new("1"));
    }

    #[test]
    fn unknown_column_is_schema_drift() {
        let mut store = ReplicaStore::new(schema());
        let mut bad = row("a", 10);
        bad.set("nonexistent", Value::Bool(true));
        let tx = ReplicationTransaction::new(ReplicaVersion::new("1"), vec![Mutation::Add { table: "item".into(), row: bad }]);
        let err = store.apply_transaction(&tx).unwrap_err();
        assert!(matches!(err, ZeroError::SchemaDrift(_)));
    }
}
