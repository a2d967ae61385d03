//! # Zero Replicator
//!
//! Ordered application of upstream change transactions into a local
//! row-addressable store (`spec.md` §4.7 "C7"). Postgres logical-replication
//! wire decoding is an external collaborator (`spec.md` §1); this crate
//! consumes only the already-decoded [`transaction::ReplicationTransaction`]
//! stream.

pub mod replicator;
pub mod retry;
pub mod store;
pub mod transaction;
pub mod wal;

pub use replicator::{Replicator, ReplicatorHalt, SharedReplica};
pub use retry::RetryPolicy;
pub use store::ReplicaStore;
pub use transaction::{Mutation, ReplicationTransaction};
pub use wal::{RuntimeEvent, RuntimeEventLog};
