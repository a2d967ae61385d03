//! # Zero Server
//!
//! The view-syncer and its durable CVR store (`spec.md` §4.8/§4.9 "C8"/"C9"):
//! per-client-group registration of queries, hydration, diff emission, and
//! TTL-driven garbage collection, layered on top of `zero-replicator`'s
//! shared replica and `zero-pipeline`'s compiled operator graphs.
//!
//! HTTP/WebSocket framing and JWT verification are external collaborators
//! (`spec.md` §1); [`transport::AuthVerifier`] and the [`messages`] vocabulary
//! fix those boundaries without implementing them.

pub mod cvr;
pub mod messages;
pub mod source;
pub mod syncer;
pub mod transport;

pub use syncer::{QueryHandle, QueryState, ViewSyncer};
