//! Dataflow operators (`spec.md` §4.2 "C2"). Every operator works over the
//! [`crate::change::Change`] vocabulary and is intentionally unaware of the
//! query AST — `zero-pipeline` compiles AST nodes into wired instances of
//! these.

pub mod fan;
pub mod filter;
pub mod join;
pub mod limit;
pub mod orderby;
pub mod start;

pub use fan::{FanIn, FanOut, UnionFanIn};
pub use filter::{Filter, Predicate};
pub use join::{Existence, Join, JoinMode};
pub use limit::Limit;
pub use orderby::OrderBy;
pub use start::start;
