//! # Zero Dataflow
//!
//! Row-addressable storage, the incremental-view-maintenance operators, and
//! the array view that materializes an operator graph's output (`spec.md`
//! §4.1, §4.2, §4.4 — components C1, C2, C4).
//!
//! This crate is deliberately unaware of the query AST (`zero-ast`): every
//! operator here is wired and driven by `zero-pipeline`, which translates AST
//! nodes into calls against the small, fixed capability set this crate
//! exposes (`spec.md` §9 "Dynamic dispatch").

pub mod change;
pub mod ops;
pub mod scratch;
pub mod source;
pub mod storage;
pub mod view;

pub use change::{Change, ChildMap, ChildSlot};
pub use scratch::Scratch;
pub use source::{Constraint, OrderDirection, RowSource, SeekKey};
pub use storage::{Commit, RowChange, TableStore};
pub use view::{Singularity, View, ViewRow, ViewSlot, ViewState};
