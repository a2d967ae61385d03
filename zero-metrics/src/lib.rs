//! # Zero Metrics
//!
//! Passive telemetry hooks (`spec.md` §4.10/§2 "C10"): documented metric-name
//! constants (mirroring `noria::metrics::recorded`) plus thin wrapper
//! functions over the `metrics` crate's `counter!`/`gauge!`/`histogram!`
//! macros. Exporting these to Prometheus/StatsD is an external collaborator's
//! job (`spec.md` §1); this crate only fixes the emission points the rest of
//! the workspace calls into.

/// Documents the set of metrics recorded by a running Zero instance.
pub mod recorded {
    /// Counter: the number of upstream change transactions committed by the
    /// replicator. Recorded once per [`crate::record_replicator_commit`]
    /// call, after the transaction's mutations have been applied and its
    /// version written (`spec.md` §4.7).
    ///
    /// | Tag | Description |
    /// | --- | ----------- |
    /// | shard | The shard the replicator is assigned to. |
    pub const REPLICATOR_TRANSACTIONS_COMMITTED: &str = "replicator.transactions_committed";

    /// Histogram: the number of row mutations in a committed transaction.
    ///
    /// | Tag | Description |
    /// | --- | ----------- |
    /// | shard | The shard the replicator is assigned to. |
    pub const REPLICATOR_TRANSACTION_SIZE: &str = "replicator.transaction_size";

    /// Counter: the number of times replication has halted with
    /// `SchemaDrift`, awaiting either an `autoReset` restart or operator
    /// intervention (`spec.md` §7).
    pub const REPLICATOR_SCHEMA_DRIFT: &str = "replicator.schema_drift";

    /// Counter: the number of IO retries attempted before a replicator
    /// transaction either succeeded or exhausted its backoff budget.
    pub const REPLICATOR_IO_RETRIES: &str = "replicator.io_retries";

    /// Counter: the number of pipeline advance ticks driven by a
    /// view-syncer actor in response to a replica-version notification.
    ///
    /// | Tag | Description |
    /// | --- | ----------- |
    /// | client_group_id | The client group the view-syncer serves. |
    pub const SYNCER_TICKS: &str = "syncer.ticks";

    /// Histogram: wall-clock microseconds spent advancing every active
    /// pipeline during one view-syncer tick.
    ///
    /// | Tag | Description |
    /// | --- | ----------- |
    /// | client_group_id | The client group the view-syncer serves. |
    pub const SYNCER_TICK_TIME: &str = "syncer.tick_time_us";

    /// Counter: the number of queries that transitioned into
    /// `Registered`/`Hydrating`/`Complete`/`Error` (tagged by `state`).
    ///
    /// | Tag | Description |
    /// | --- | ----------- |
    /// | client_group_id | The client group the view-syncer serves. |
    /// | state | The state the query transitioned into. |
    pub const SYNCER_QUERY_STATE_TRANSITIONS: &str = "syncer.query_state_transitions";

    /// Gauge: the number of queries currently active (not yet purged) for a
    /// client group.
    ///
    /// | Tag | Description |
    /// | --- | ----------- |
    /// | client_group_id | The client group the view-syncer serves. |
    pub const SYNCER_ACTIVE_QUERIES: &str = "syncer.active_queries";

    /// Counter: the number of CVR row entries purged by the background
    /// sweeper in one round (`spec.md` §4.9).
    pub const CVR_PURGED_ROWS: &str = "cvr.purged_rows";

    /// Counter: the number of client-group instances purged for inactivity
    /// in one round.
    pub const CVR_PURGED_GROUPS: &str = "cvr.purged_groups";

    /// Gauge: the purger's current batch size, adapted per round per
    /// `spec.md` §4.9.
    pub const CVR_PURGE_BATCH_SIZE: &str = "cvr.purge_batch_size";

    /// Gauge: the purger's current sleep interval between rounds, in
    /// milliseconds.
    pub const CVR_PURGE_INTERVAL_MS: &str = "cvr.purge_interval_ms";

    /// Counter: permission-denied outcomes surfaced to a client as an empty
    /// completed result, rather than propagated as an error (`spec.md` §7).
    pub const PERMISSIONS_DENIED: &str = "permissions.denied";
}

/// Emits [`recorded::REPLICATOR_TRANSACTIONS_COMMITTED`] and
/// [`recorded::REPLICATOR_TRANSACTION_SIZE`] for one committed transaction.
pub fn record_replicator_commit(shard_id: &str, mutation_count: usize) {
    metrics::counter!(recorded::REPLICATOR_TRANSACTIONS_COMMITTED, "shard" => shard_id.to_string())
        .increment(1);
    metrics::histogram!(recorded::REPLICATOR_TRANSACTION_SIZE, "shard" => shard_id.to_string())
        .record(mutation_count as f64);
}

/// Emits [`recorded::REPLICATOR_SCHEMA_DRIFT`].
pub fn record_schema_drift() {
    metrics::counter!(recorded::REPLICATOR_SCHEMA_DRIFT).increment(1);
}

/// Emits [`recorded::REPLICATOR_IO_RETRIES`].
pub fn record_io_retry() {
    metrics::counter!(recorded::REPLICATOR_IO_RETRIES).increment(1);
}

/// Emits [`recorded::SYNCER_TICKS`] and [`recorded::SYNCER_TICK_TIME`] for
/// one view-syncer advance cycle.
pub fn record_syncer_tick(client_group_id: &str, elapsed_us: u64) {
    metrics::counter!(recorded::SYNCER_TICKS, "client_group_id" => client_group_id.to_string())
        .increment(1);
    metrics::histogram!(recorded::SYNCER_TICK_TIME, "client_group_id" => client_group_id.to_string())
        .record(elapsed_us as f64);
}

/// Emits [`recorded::SYNCER_QUERY_STATE_TRANSITIONS`].
pub fn record_query_state_transition(client_group_id: &str, state: &str) {
    metrics::counter!(
        recorded::SYNCER_QUERY_STATE_TRANSITIONS,
        "client_group_id" => client_group_id.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

/// Emits [`recorded::SYNCER_ACTIVE_QUERIES`].
pub fn record_active_queries(client_group_id: &str, count: u64) {
    metrics::gauge!(recorded::SYNCER_ACTIVE_QUERIES, "client_group_id" => client_group_id.to_string())
        .set(count as f64);
}

/// Emits [`recorded::CVR_PURGED_ROWS`] and [`recorded::CVR_PURGED_GROUPS`]
/// for one purger round.
pub fn record_cvr_purge_round(purged_rows: u64, purged_groups: u64) {
    metrics::counter!(recorded::CVR_PURGED_ROWS).increment(purged_rows);
    metrics::counter!(recorded::CVR_PURGED_GROUPS).increment(purged_groups);
}

/// Emits [`recorded::CVR_PURGE_BATCH_SIZE`] and
/// [`recorded::CVR_PURGE_INTERVAL_MS`] after the purger adapts its pacing.
pub fn record_cvr_purge_pacing(batch_size: u64, interval_ms: u64) {
    metrics::gauge!(recorded::CVR_PURGE_BATCH_SIZE).set(batch_size as f64);
    metrics::gauge!(recorded::CVR_PURGE_INTERVAL_MS).set(interval_ms as f64);
}

/// Emits [`recorded::PERMISSIONS_DENIED`].
pub fn record_permission_denied() {
    metrics::counter!(recorded::PERMISSIONS_DENIED).increment(1);
}
