//! The durable CVR shape of `spec.md` §4.9/§6: one record per client group,
//! covering its registered queries, desired-query assignments per client,
//! and the row/version set its active queries currently materialize.

use chrono::{DateTime, Utc};

use zero_core::ReplicaVersion;

/// `instances`: one row per client group, tracked only for its
/// `last_active` watermark (`spec.md` §4.9 "Indexes: `(lastActive asc)` on
/// instances", used by the purger to find sweep candidates).
#[derive(Debug, Clone, PartialEq)]
pub struct CvrInstance {
    pub client_group_id: String,
    pub last_active: DateTime<Utc>,
    /// The replica version as of this CVR's last successful persist, used
    /// as the resume point on reconnect.
    pub rows_version: ReplicaVersion,
}

/// `clients`: one row per client currently connected within a client group.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    pub client_group_id: String,
    pub client_id: String,
}

/// `queries`: one row per registered query, keyed by its combined
/// AST-and-policy hash (`spec.md` §4.6 "its hash fingerprint is included in
/// CVR query identity").
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub client_group_id: String,
    pub query_hash: String,
    /// The completed AST, serialized, so a CVR can be rehydrated without
    /// re-deriving it from the client's original request.
    pub ast_json: String,
    pub ttl_ms: u64,
    pub last_use: DateTime<Utc>,
}

/// `desires`: which clients within a group currently want which queries
/// kept alive (`spec.md` §3 "CVR" `desires` field).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DesireRecord {
    pub client_group_id: String,
    pub client_id: String,
    pub query_hash: String,
}

/// `rows` + `rowsVersion`: the `(table, pk) -> version` coverage map of
/// `spec.md` §3 "CVR" invariant — every row here must be reachable by at
/// least one active query.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub client_group_id: String,
    pub table: String,
    /// The row's primary key, rendered as its `RowKey` `Display` form — a
    /// CVR row record only needs a stable, comparable identity, not the
    /// structured key back.
    pub row_key: String,
    pub version: ReplicaVersion,
}
