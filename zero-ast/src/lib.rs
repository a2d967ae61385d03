//! # Zero AST
//!
//! The canonical query IR (`spec.md` §4.5 "C5"): the AST itself
//! ([`ast::Ast`]), completion against a schema ([`ast::complete`]),
//! normalization ([`simplify::simplify`]), and the stable content hash used
//! to key CVR queries ([`hash::canonical_hash`]).
//!
//! The usual pipeline is: build an [`Ast`], call [`complete`] against the
//! schema to append primary-key order columns and validate junction/NOT
//! EXISTS invariants, run [`simplify`] over the WHERE tree to reach a
//! canonical form, then [`canonical_hash`] the result. `zero-pipeline`
//! consumes the same [`CompletedAst`] to build the operator graph.

pub mod ast;
pub mod expr;
pub mod hash;
pub mod simplify;

pub use ast::{complete, Ast, CompletedAst, OrderDirection, Related, Start};
pub use expr::{compare, CompareOp, Expr, ExistsExpr};
pub use hash::canonical_hash;
pub use simplify::simplify;
