//! The ordered change-transaction shape the replicator consumes (`spec.md`
//! §4.7, §6 "Change stream").

use zero_core::{ReplicaVersion, Row, RowKey};

/// One row mutation within a transaction, scoped to a table by name. Mirrors
/// `zero_dataflow::storage::RowChange`, but keyed by table since a single
/// transaction can touch many tables at once (`spec.md` §6: "a batch of row
/// mutations").
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Add { table: String, row: Row },
    Remove { table: String, key: RowKey },
    Edit { table: String, old: Row, new: Row },
}

impl Mutation {
    pub fn table(&self) -> &str {
        match self {
            Mutation::Add { table, .. } | Mutation::Remove { table, .. } | Mutation::Edit { table, .. } => table,
        }
    }
}

/// One committed upstream transaction: a version token and the mutations it
/// stamps with that version (`spec.md` §6). Versions arrive strictly
/// increasing; the replicator rejects (as `ZeroError::Invariant`) any
/// transaction that doesn't advance the previously-applied version.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationTransaction {
    pub version: ReplicaVersion,
    pub mutations: Vec<Mutation>,
}

impl ReplicationTransaction {
    pub fn new(version: ReplicaVersion, mutations: Vec<Mutation>) -> Self {
        ReplicationTransaction { version, mutations }
    }

    /// Every table this transaction mutates, deduplicated, in first-seen
    /// order. Used to scope the atomic-commit validation pass.
    pub fn tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for m in &self.mutations {
            let t = m.table();
            if !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }
}
