//! The view-syncer actor (`spec.md` §4.8 "C8"): per client-group, holds the
//! set of active queries and drives them from replica commits, computing CVR
//! deltas and poke messages.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::warn;

use zero_ast::Ast;
use zero_core::errors::ZeroResult;
use zero_core::{Row, Schema};

use zero_dataflow::storage::Commit;
use zero_dataflow::{Change, RowChange};
use zero_permissions::{AuthClaims, Policy};
use zero_pipeline::BuildContext;
use zero_replicator::SharedReplica;

use crate::cvr::{CvrBackend, QueryRecord, RowRecord};
use crate::messages::{ChangeDesiredQueries, DownstreamMessage, ErrorKind, Patch};
use crate::source::ReplicaSourceFactory;
use crate::syncer::hashing::query_hash;
use crate::syncer::query::{QueryHandle, QueryState};

/// One client group's live sync state. Cooperative and single-threaded by
/// construction: every method takes `&mut self`, and the host application is
/// expected to serialize calls onto one task per client group (`spec.md` §5
/// "per client-group single-threaded cooperative actor").
pub struct ViewSyncer {
    client_group_id: String,
    schema: Arc<Schema>,
    policy: Policy,
    claims: AuthClaims,
    cvr: Arc<dyn CvrBackend>,
    ctx: BuildContext,
    queries: HashMap<String, QueryHandle>,
    clients: HashMap<String, HashSet<String>>,
    table_subscriptions: HashMap<String, broadcast::Receiver<Commit>>,
    replica: SharedReplica,
}

impl ViewSyncer {
    pub fn new(
        client_group_id: impl Into<String>,
        schema: Arc<Schema>,
        policy: Policy,
        cvr: Arc<dyn CvrBackend>,
        replica: SharedReplica,
    ) -> Self {
        let ctx = BuildContext {
            schema: schema.clone(),
            sources: Arc::new(ReplicaSourceFactory::new(replica.clone())),
        };
        ViewSyncer {
            client_group_id: client_group_id.into(),
            schema,
            policy,
            claims: AuthClaims::anonymous(),
            cvr,
            ctx,
            queries: HashMap::new(),
            clients: HashMap::new(),
            table_subscriptions: HashMap::new(),
            replica,
        }
    }

    pub fn client_group_id(&self) -> &str {
        &self.client_group_id
    }

    /// `spec.md` §4.8 `initConnection(clientID, cookie?)`. Registers the
    /// client and touches the CVR instance's `lastActive` watermark; the
    /// caller is expected to follow up with `changeDesiredQueries` to
    /// (re)establish which queries this client wants.
    pub async fn init_connection(&mut self, client_id: impl Into<String>) -> ZeroResult<()> {
        let client_id = client_id.into();
        self.clients.entry(client_id).or_default();
        self.cvr.touch_instance(&self.client_group_id, Utc::now()).await?;
        Ok(())
    }

    pub fn update_auth(&mut self, claims: AuthClaims) {
        self.claims = claims;
    }

    pub fn clear_auth(&mut self) {
        self.claims = AuthClaims::anonymous();
    }

    /// `spec.md` §4.8 `deleteClients(clientIDs)`: drops the clients' desire
    /// records; a query with no remaining desirer transitions toward
    /// purge on the next purger sweep rather than being torn down inline.
    pub async fn delete_clients(&mut self, client_ids: &[String]) -> ZeroResult<()> {
        for client_id in client_ids {
            self.clients.remove(client_id);
            self.cvr.remove_client(&self.client_group_id, client_id).await?;
            for query in self.queries.values_mut() {
                query.desired_by.remove(client_id);
            }
        }
        Ok(())
    }

    /// `spec.md` §4.8 `changeDesiredQueries`: registers newly-added queries
    /// (permission-transforming, compiling, hydrating, and subscribing each
    /// one), drops removed ones, and returns the poke messages needed to
    /// bring `client_id` up to date.
    pub async fn change_desired_queries(
        &mut self,
        msg: ChangeDesiredQueries,
    ) -> ZeroResult<Vec<DownstreamMessage>> {
        self.clients.entry(msg.client_id.clone()).or_default();
        let mut pokes = Vec::new();

        for desired in msg.add {
            let hash = match self.ensure_registered(&desired.query_hash, &desired.ast_json, msg.ttl_ms).await {
                Ok(h) => h,
                Err(e) => {
                    pokes.push(DownstreamMessage::Error { kind: ErrorKind::from(&e), message: e.to_string() });
                    continue;
                }
            };
            if let Some(query) = self.queries.get_mut(&hash) {
                query.desired_by.insert(msg.client_id.clone());
            }
            self.clients.get_mut(&msg.client_id).unwrap().insert(hash.clone());
            self.cvr
                .set_desire(crate::cvr::DesireRecord {
                    client_group_id: self.client_group_id.clone(),
                    client_id: msg.client_id.clone(),
                    query_hash: hash.clone(),
                })
                .await?;
            if let Some(query) = self.queries.get(&hash) {
                let pk = &self.schema.table(&query.table)?.primary_key;
                pokes.push(snapshot_poke(query, pk));
            }
        }

        for hash in msg.remove {
            if let Some(set) = self.clients.get_mut(&msg.client_id) {
                set.remove(&hash);
            }
            if let Some(query) = self.queries.get_mut(&hash) {
                query.desired_by.remove(&msg.client_id);
            }
            self.cvr.remove_desire(&self.client_group_id, &msg.client_id, &hash).await?;
        }

        Ok(pokes)
    }

    async fn ensure_registered(&mut self, query_hash_hint: &str, ast_json: &str, ttl_ms: Option<u64>) -> ZeroResult<String> {
        if self.queries.contains_key(query_hash_hint) {
            return Ok(query_hash_hint.to_string());
        }
        let ast: Ast = serde_json::from_str(ast_json)
            .map_err(|e| zero_core::errors::internal_err(format!("malformed query ast: {e}")))?;
        let transformed = zero_permissions::transform_query(ast, &self.schema, &self.policy, &self.claims)?;
        let completed = zero_ast::complete(transformed, &self.schema)?;
        let hash = query_hash(&completed, &self.policy);

        let mut handle = QueryHandle::new(
            hash.clone(),
            ast_json.to_string(),
            &completed,
            &self.schema,
            &self.ctx,
            ttl_ms.unwrap_or(10 * 60 * 1000),
        )?;

        let root_source = self.ctx.sources.table_source(&handle.table)?;
        if let Err(e) = handle.hydrate(root_source.as_ref()) {
            handle.transition_to_error(clone_error(&e));
            self.queries.insert(hash.clone(), handle);
            return Err(e);
        }

        for table in std::iter::once(handle.table.clone()).chain(handle.dependent_tables.clone()) {
            self.table_subscriptions.entry(table.clone()).or_insert_with(|| {
                self.replica.read().table(&table).map(|t| t.connect()).unwrap_or_else(|_| {
                    let (_tx, rx) = broadcast::channel(1);
                    rx
                })
            });
        }

        self.cvr
            .upsert_query(QueryRecord {
                client_group_id: self.client_group_id.clone(),
                query_hash: hash.clone(),
                ast_json: ast_json.to_string(),
                ttl_ms: handle.ttl_ms,
                last_use: Utc::now(),
            })
            .await?;
        self.persist_rows(&handle).await?;
        self.queries.insert(hash.clone(), handle);
        Ok(hash)
    }

    async fn persist_rows(&self, query: &QueryHandle) -> ZeroResult<()> {
        let pk = self.schema.table(&query.table)?.primary_key.clone();
        let rows: Vec<RowRecord> = query
            .view()
            .data()
            .iter()
            .map(|view_row| RowRecord {
                client_group_id: self.client_group_id.clone(),
                table: query.table.clone(),
                row_key: view_row.columns.key_for(&pk).to_string(),
                version: self.replica.read().current_version(),
            })
            .collect();
        if !rows.is_empty() {
            self.cvr.upsert_rows(rows).await?;
        }
        Ok(())
    }

    /// One replica tick (`spec.md` §4.8 "Per replica tick"): drains every
    /// subscribed table's pending commits, advances the affected queries'
    /// pipelines, persists the resulting CVR delta, and returns the poke
    /// messages to deliver.
    pub async fn tick(&mut self) -> ZeroResult<Vec<DownstreamMessage>> {
        let started = std::time::Instant::now();
        let mut patches_by_query: HashMap<String, Vec<Patch>> = HashMap::new();

        let tables: Vec<String> = self.table_subscriptions.keys().cloned().collect();
        for table in tables {
            loop {
                let commit = {
                    let rx = self.table_subscriptions.get_mut(&table).unwrap();
                    match rx.try_recv() {
                        Ok(c) => c,
                        Err(broadcast::error::TryRecvError::Empty) => break,
                        Err(broadcast::error::TryRecvError::Closed) => break,
                        Err(broadcast::error::TryRecvError::Lagged(n)) => {
                            warn!(table = %table, skipped = n, "view-syncer lagged behind replica commits");
                            continue;
                        }
                    }
                };
                self.advance_queries_for(&table, &commit, &mut patches_by_query)?;
            }
        }

        let mut pokes = Vec::new();
        for (hash, patch) in patches_by_query {
            if patch.is_empty() {
                continue;
            }
            if let Some(query) = self.queries.get(&hash) {
                self.persist_rows(query).await?;
                pokes.push(DownstreamMessage::Poke {
                    patch,
                    cookie: self.replica.read().current_version().to_string(),
                    complete: query.state == QueryState::Complete,
                    error: None,
                });
            }
        }

        zero_metrics::record_syncer_tick(&self.client_group_id, started.elapsed().as_micros() as u64);
        zero_metrics::record_active_queries(&self.client_group_id, self.queries.len() as u64);
        Ok(pokes)
    }

    fn advance_queries_for(
        &mut self,
        table: &str,
        commit: &Commit,
        patches_by_query: &mut HashMap<String, Vec<Patch>>,
    ) -> ZeroResult<()> {
        let source_pk = self.schema.table(table)?.primary_key.clone();
        let change = row_change_to_change(&commit.change, &source_pk);
        for (hash, query) in self.queries.iter_mut() {
            let out = if query.table == table {
                query.advance_root(change.clone())
            } else if query.dependent_tables.iter().any(|t| t == table) {
                query.advance_dependent(table, &change)
            } else {
                continue;
            };
            match out {
                Ok(changes) => {
                    let query_pk = &self.schema.table(&query.table)?.primary_key;
                    let patches = patches_by_query.entry(hash.clone()).or_default();
                    for c in changes {
                        if let Some(patch) = change_to_patch(&c, &query.table, query_pk) {
                            patches.push(patch);
                        }
                    }
                }
                Err(e) => {
                    warn!(client_group_id = %self.client_group_id, query_hash = %hash, error = %e, "query pipeline advance failed");
                    query.transition_to_error(e);
                }
            }
        }
        Ok(())
    }

    pub fn inspect(&self) -> super::snapshot::SyncerSnapshot {
        super::snapshot::SyncerSnapshot::from_syncer(self)
    }

    pub(crate) fn queries(&self) -> &HashMap<String, QueryHandle> {
        &self.queries
    }

    pub(crate) fn clients(&self) -> &HashMap<String, HashSet<String>> {
        &self.clients
    }
}

fn row_change_to_change(change: &RowChange, pk: &[String]) -> Change {
    match change {
        RowChange::Add(row) => Change::Add { row: row.clone(), children: Default::default() },
        RowChange::Remove(key) => {
            let row = Row::from_columns(
                pk.iter().cloned().zip(key.values().iter().cloned()),
            );
            Change::Remove { row, children: Default::default() }
        }
        RowChange::Edit(old, new) => Change::Edit { old: old.clone(), new: new.clone() },
    }
}

fn change_to_patch(change: &Change, table: &str, pk: &[String]) -> Option<Patch> {
    match change {
        Change::Add { row, .. } => Some(Patch::Put {
            table: table.to_string(),
            row_key: row.key_for(pk).to_string(),
            row: row.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }),
        Change::Remove { row, .. } => {
            Some(Patch::Del { table: table.to_string(), row_key: row.key_for(pk).to_string() })
        }
        Change::Edit { new, .. } => Some(Patch::Put {
            table: table.to_string(),
            row_key: new.key_for(pk).to_string(),
            row: new.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }),
        Change::Child { .. } | Change::OutputComplete => None,
    }
}

fn snapshot_poke(query: &QueryHandle, pk: &[String]) -> DownstreamMessage {
    let patch = query
        .view()
        .data()
        .iter()
        .map(|view_row| Patch::Put {
            table: query.table.clone(),
            row_key: view_row.columns.key_for(pk).to_string(),
            row: view_row.columns.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        })
        .collect();
    DownstreamMessage::Poke { patch, cookie: String::new(), complete: query.state == QueryState::Complete, error: None }
}

fn clone_error(e: &zero_core::ZeroError) -> zero_core::ZeroError {
    zero_core::ZeroError::Invariant(e.to_string())
}
