//! The replicator actor (`spec.md` §4.7 "C7"): consumes an ordered stream of
//! upstream change transactions and applies them to a [`ReplicaStore`],
//! notifying subscribers of each new committed version.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info, warn};

use zero_core::errors::ZeroResult;
use zero_core::{ReplicaVersion, ZeroError};

use crate::retry::RetryPolicy;
use crate::store::ReplicaStore;
use crate::transaction::ReplicationTransaction;
use crate::wal::{RuntimeEvent, RuntimeEventLog};

/// A [`ReplicaStore`] shared between the single writing replicator actor and
/// any number of reading view-syncer pipelines (`spec.md` §5 "the replica
/// store is readable concurrently by any number of view-syncers after the
/// writer commits; writers are serialized by a single replicator actor").
pub type SharedReplica = Arc<RwLock<ReplicaStore>>;

/// Why [`Replicator::run`] stopped before its input stream ended.
#[derive(Debug)]
pub enum ReplicatorHalt {
    /// `spec.md` §7: incompatible change observed. `autoReset` decides
    /// whether the caller should restart-and-wipe or simply refuse to serve.
    SchemaDrift { cause: String, auto_reset: bool },
    /// An internal invariant was violated, or the IO retry budget was
    /// exhausted — `spec.md` §7: "escalates to fatal after configured
    /// budget". Unlike `SchemaDrift`, the process is expected to exit
    /// (`spec.md` §6 "Exit codes").
    Fatal(ZeroError),
}

impl std::fmt::Display for ReplicatorHalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicatorHalt::SchemaDrift { cause, auto_reset } => {
                write!(f, "schema drift ({cause}), auto_reset={auto_reset}")
            }
            ReplicatorHalt::Fatal(e) => write!(f, "fatal: {e}"),
        }
    }
}

pub struct Replicator {
    shard_id: String,
    store: SharedReplica,
    wal: RuntimeEventLog,
    retry: RetryPolicy,
    auto_reset: bool,
    notify: broadcast::Sender<ReplicaVersion>,
}

impl Replicator {
    pub fn new(
        shard_id: impl Into<String>,
        store: SharedReplica,
        retry: RetryPolicy,
        auto_reset: bool,
    ) -> Self {
        let (notify, _) = broadcast::channel(1024);
        Replicator {
            shard_id: shard_id.into(),
            store,
            wal: RuntimeEventLog::new(),
            retry,
            auto_reset,
            notify,
        }
    }

    /// A fresh subscription to committed-version notifications, for a
    /// view-syncer to drive its pipelines from (`spec.md` §4.1 "connect").
    pub fn subscribe(&self) -> broadcast::Receiver<ReplicaVersion> {
        self.notify.subscribe()
    }

    /// Replays any WAL entries newer than the store's current checkpoint
    /// before the subscriber channel is meaningfully open for business
    /// (`spec.md` §4.7 guarantee (iii)). Call once at startup, before
    /// [`Replicator::run`].
    pub fn replay_wal(&mut self, wal: RuntimeEventLog) -> ZeroResult<()> {
        let checkpoint = self.store.read().current_version();
        let mut replayed = 0;
        for entry in wal.entries_after(&checkpoint) {
            self.store.write().apply_transaction(&entry.transaction)?;
            replayed += 1;
        }
        info!(shard_id = %self.shard_id, replayed, "replayed in-flight WAL entries on startup");
        self.wal = wal;
        Ok(())
    }

    /// Drives `stream` to completion (or until a halt condition). Each
    /// successfully-applied transaction is appended to the in-memory WAL,
    /// committed into the shared store, and broadcast to subscribers, in
    /// that order — so a subscriber woken by the broadcast always observes
    /// the committed row state (`spec.md` §4.1 "push is atomic vs
    /// observers").
    pub async fn run<S>(&mut self, mut stream: S) -> Result<(), ReplicatorHalt>
    where
        S: Stream<Item = ZeroResult<ReplicationTransaction>> + Unpin,
    {
        let mut io_attempt = 0u32;
        loop {
            match stream.next().await {
                None => return Ok(()),
                Some(Err(e)) if e.is_retryable() => {
                    if !self.retry.should_retry(io_attempt) {
                        error!(shard_id = %self.shard_id, "IO retry budget exhausted");
                        return Err(ReplicatorHalt::Fatal(e));
                    }
                    io_attempt += 1;
                    let delay = self.retry.delay_for_attempt(io_attempt);
                    warn!(shard_id = %self.shard_id, attempt = io_attempt, ?delay, "retrying after IO error");
                    zero_metrics::record_io_retry();
                    sleep(delay).await;
                }
                Some(Err(e)) => {
                    return self.handle_fatal(e);
                }
                Some(Ok(tx)) => {
                    io_attempt = 0;
                    if let Err(e) = self.commit(tx) {
                        return self.handle_fatal(e);
                    }
                }
            }
        }
    }

    fn handle_fatal(&self, e: ZeroError) -> Result<(), ReplicatorHalt> {
        match e {
            ZeroError::SchemaDrift(cause) => {
                zero_metrics::record_schema_drift();
                error!(shard_id = %self.shard_id, %cause, auto_reset = self.auto_reset, "schema drift detected");
                Err(ReplicatorHalt::SchemaDrift { cause, auto_reset: self.auto_reset })
            }
            other => {
                error!(shard_id = %self.shard_id, error = %other, "replicator halted on a non-retryable error");
                Err(ReplicatorHalt::Fatal(other))
            }
        }
    }

    fn commit(&mut self, tx: ReplicationTransaction) -> ZeroResult<()> {
        let mutation_count = tx.mutations.len();
        self.store.write().apply_transaction(&tx)?;
        let version = tx.version.clone();
        self.wal.append(RuntimeEvent { recorded_at: chrono::Utc::now(), transaction: tx });
        zero_metrics::record_replicator_commit(&self.shard_id, mutation_count);
        let _ = self.notify.send(version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Mutation;
    use tokio_stream::iter as stream_iter;
    use zero_core::{ColumnKind, ColumnSpec, Row, Schema, TableSpec, Value};

    fn schema() -> Schema {
        let item = TableSpec {
            name: "item".into(),
            columns: vec![
                ColumnSpec { name: "id".into(), kind: ColumnKind::String },
                ColumnSpec { name: "_0_version".into(), kind: ColumnKind::String },
            ],
            primary_key: vec!["id".into()],
            unique_keys: vec![],
            zero_version_column: "_0_version".into(),
        };
        Schema { tables: [(item.name.clone(), item)].into_iter().collect(), relationships: vec![] }
    }

    fn add(id: &str, version: &str) -> ZeroResult<ReplicationTransaction> {
        Ok(ReplicationTransaction::new(
            ReplicaVersion::new(version),
            vec![Mutation::Add {
                table: "item".into(),
                row: Row::from_columns([("id".to_string(), Value::String(id.to_string()))]),
            }],
        ))
    }

    #[tokio::test]
    async fn applies_transactions_in_order_and_notifies_subscribers() {
        let store = Arc::new(RwLock::new(ReplicaStore::new(schema())));
        let mut replicator = Replicator::new("shard0", store.clone(), RetryPolicy::default(), false);
        let mut sub = replicator.subscribe();

        let stream = stream_iter(vec![add("a", "1"), add("b", "2")]);
        replicator.run(stream).await.unwrap();

        assert_eq!(store.read().current_version(), ReplicaVersion::new("2"));
        assert_eq!(sub.recv().await.unwrap(), ReplicaVersion::new("1"));
        assert_eq!(sub.recv().await.unwrap(), ReplicaVersion::new("2"));
    }

    #[tokio::test]
    async fn schema_drift_halts_with_cause() {
        let store = Arc::new(RwLock::new(ReplicaStore::new(schema())));
        let mut replicator = Replicator::new("shard0", store, RetryPolicy::default(), true);
        let bad_tx: ZeroResult<ReplicationTransaction> = Err(ZeroError::SchemaDrift("column dropped".into()));
        let stream = stream_iter(vec![bad_tx]);
        let err = replicator.run(stream).await.unwrap_err();
        assert!(matches!(err, ReplicatorHalt::SchemaDrift { auto_reset: true, .. }));
    }

    #[tokio::test]
    async fn io_errors_retry_until_budget_exhausted() {
        let store = Arc::new(RwLock::new(ReplicaStore::new(schema())));
        let retry = RetryPolicy {
            max_retries: 2,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(1),
            exponential_base: 1.0,
        };
        let mut replicator = Replicator::new("shard0", store, retry, false);
        let io_err: ZeroResult<ReplicationTransaction> = Err(ZeroError::Io("connection reset".into()));
        let stream = stream_iter(vec![io_err, Err(ZeroError::Io("connection reset".into())), Err(ZeroError::Io("connection reset".into()))]);
        let err = replicator.run(stream).await.unwrap_err();
        assert!(matches!(err, ReplicatorHalt::Fatal(ZeroError::Io(_))));
    }

    #[tokio::test]
    async fn replay_wal_applies_entries_newer_than_checkpoint() {
        let store = Arc::new(RwLock::new(ReplicaStore::new(schema())));
        let mut wal = RuntimeEventLog::new();
        wal.append(RuntimeEvent {
            recorded_at: chrono::Utc::now(),
            transaction: add("a", "1").unwrap(),
        });
        let mut replicator = Replicator::new("shard0", store.clone(), RetryPolicy::default(), false);
        replicator.replay_wal(wal).unwrap();
        assert_eq!(store.read().current_version(), ReplicaVersion::new("1"));
    }
}
