//! # Zero core
//!
//! Shared data model (`Value`, `Row`, `Schema`, `ReplicaVersion`) and error
//! taxonomy for the Zero sync engine. Every other crate in this workspace
//! depends on this one; it depends on nothing else in the workspace.
//!
//! Zero maintains incrementally-computed relational views over a replicated
//! upstream dataset and serves per-client differential reads from a durable
//! log (a Client View Record, or CVR). This crate fixes the vocabulary that
//! the rest of the system — the dataflow operators, the pipeline builder, the
//! permission transformer, the replicator, and the view-syncer — is built
//! from.

pub mod config;
pub mod errors;
pub mod row;
pub mod schema;
pub mod value;
pub mod version;

pub use errors::{ZeroError, ZeroResult};
pub use row::{Row, RowKey};
pub use schema::{Cardinality, ColumnSpec, JunctionSpec, Relationship, Schema, TableSpec};
pub use value::{ColumnKind, Value};
pub use version::ReplicaVersion;
