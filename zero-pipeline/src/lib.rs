//! # Zero Pipeline
//!
//! The query compiler (`spec.md` §4.3 "C3"): resolves a completed AST
//! ([`zero_ast::CompletedAst`]) into a [`plan::PlanNode`] against a schema,
//! then [`builder::build_pipeline`] wires that plan into a live
//! [`pipeline::Pipeline`] of `zero-dataflow` operators.
//!
//! This crate is the only place that knows both the query AST
//! (`zero-ast`) and the dataflow operator vocabulary (`zero-dataflow`);
//! neither of those crates is aware of the other.

pub mod builder;
pub mod pipeline;
pub mod plan;
pub mod predicate;
pub mod source;

pub use builder::{build_pipeline, order_directions, required_tables};
pub use pipeline::{ExistsGate, Pipeline, RelatedEdge, WhereStage, WindowSpec};
pub use plan::{build_plan, PlanExists, PlanExpr, PlanNode, PlanRelated};
pub use source::{child_source_for, BuildContext, SourceFactory};
