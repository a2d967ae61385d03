//! Adapts the live [`zero_replicator::SharedReplica`] to the
//! [`zero_pipeline::SourceFactory`] boundary a compiled pipeline pulls
//! through (`spec.md` §4.3 "C3" / §4.1 "C1"): a view-syncer never reaches
//! into `TableStore`s directly, it only ever asks for a named table's
//! current [`RowSource`].

use std::sync::Arc;

use zero_core::errors::ZeroResult;
use zero_core::Row;

use zero_dataflow::{Constraint, RowSource};
use zero_pipeline::SourceFactory;
use zero_replicator::SharedReplica;

pub struct ReplicaSourceFactory {
    replica: SharedReplica,
}

impl ReplicaSourceFactory {
    pub fn new(replica: SharedReplica) -> Self {
        ReplicaSourceFactory { replica }
    }
}

impl SourceFactory for ReplicaSourceFactory {
    fn table_source(&self, table: &str) -> ZeroResult<Arc<dyn RowSource>> {
        Ok(Arc::new(ReplicaTableSource { replica: self.replica.clone(), table: table.to_string() }))
    }
}

/// Reads straight through to the replica's live [`zero_dataflow::TableStore`]
/// on every fetch, rather than snapshotting — a pipeline's hydration pull and
/// a RELATED child's re-fetch both want the current row set, not a point in
/// time fixed at source construction.
struct ReplicaTableSource {
    replica: SharedReplica,
    table: String,
}

impl RowSource for ReplicaTableSource {
    fn fetch(&self, constraint: &Constraint) -> ZeroResult<Vec<Row>> {
        self.replica.read().table(&self.table)?.fetch_ordered(constraint, None)
    }
}
