//! The Client View Record store (`spec.md` §2 "C9", §4.9, §6): the durable
//! record of what every client group has seen, used to compute diffs on
//! reconnect and to drive the background purger.

pub mod backend;
pub mod memory;
pub mod model;
pub mod pacing;
pub mod purge;

pub use backend::{CvrBackend, PgCvrStore};
pub use memory::MemoryCvrStore;
pub use model::{ClientRecord, CvrInstance, DesireRecord, QueryRecord, RowRecord};
pub use pacing::PurgePacing;
pub use purge::{purge_round, run_purge_loop, PurgeConfig};
