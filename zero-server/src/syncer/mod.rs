//! The view-syncer actor (`spec.md` §2 "C8", §4.8): per client-group, the
//! set of live queries, their state machines, and the `inspect()` snapshot
//! exposed to transport diagnostics.

pub mod actor;
pub mod hashing;
pub mod query;
pub mod snapshot;

pub use actor::ViewSyncer;
pub use hashing::query_hash;
pub use query::{QueryHandle, QueryState};
pub use snapshot::SyncerSnapshot;
