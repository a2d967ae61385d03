//! `spec.md` §4.8 `inspect()` — diagnostics: a serializable snapshot of a
//! [`super::actor::ViewSyncer`]'s live state, with no side effects on the
//! syncer itself.

use serde::{Deserialize, Serialize};

use super::actor::ViewSyncer;
use super::query::QueryState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySnapshot {
    pub query_hash: String,
    pub table: String,
    pub state: String,
    pub desired_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    pub client_id: String,
    pub desired_queries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncerSnapshot {
    pub client_group_id: String,
    pub queries: Vec<QuerySnapshot>,
    pub clients: Vec<ClientSnapshot>,
}

impl SyncerSnapshot {
    pub fn from_syncer(syncer: &ViewSyncer) -> Self {
        let mut queries: Vec<QuerySnapshot> = syncer
            .queries()
            .values()
            .map(|q| QuerySnapshot {
                query_hash: q.query_hash.clone(),
                table: q.table.clone(),
                state: state_label(&q.state),
                desired_by: {
                    let mut v: Vec<String> = q.desired_by.iter().cloned().collect();
                    v.sort();
                    v
                },
            })
            .collect();
        queries.sort_by(|a, b| a.query_hash.cmp(&b.query_hash));

        let mut clients: Vec<ClientSnapshot> = syncer
            .clients()
            .iter()
            .map(|(client_id, hashes)| {
                let mut desired_queries: Vec<String> = hashes.iter().cloned().collect();
                desired_queries.sort();
                ClientSnapshot { client_id: client_id.clone(), desired_queries }
            })
            .collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));

        SyncerSnapshot { client_group_id: syncer.client_group_id().to_string(), queries, clients }
    }
}

fn state_label(state: &QueryState) -> String {
    match state {
        QueryState::Registered => "registered".to_string(),
        QueryState::Hydrating => "hydrating".to_string(),
        QueryState::Complete => "complete".to_string(),
        QueryState::Idle => "idle".to_string(),
        QueryState::Purged => "purged".to_string(),
        QueryState::Error(cause) => format!("error({cause})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cvr::MemoryCvrStore;
    use std::sync::Arc;
    use zero_core::{ColumnKind, ColumnSpec, Schema, TableSpec};
    use zero_permissions::Policy;

    fn schema() -> Schema {
        let item = TableSpec {
            name: "item".into(),
            columns: vec![ColumnSpec { name: "id".into(), kind: ColumnKind::String }],
            primary_key: vec!["id".into()],
            unique_keys: vec![],
            zero_version_column: "_0_version".into(),
        };
        Schema { tables: [(item.name.clone(), item)].into_iter().collect(), relationships: vec![] }
    }

    #[tokio::test]
    async fn snapshot_reports_empty_syncer() {
        let replica = Arc::new(parking_lot::RwLock::new(zero_replicator::ReplicaStore::new(schema())));
        let syncer =
            ViewSyncer::new("group1", Arc::new(schema()), Policy::default(), Arc::new(MemoryCvrStore::new()), replica);
        let snapshot = syncer.inspect();
        assert_eq!(snapshot.client_group_id, "group1");
        assert!(snapshot.queries.is_empty());
        assert!(snapshot.clients.is_empty());
    }
}
