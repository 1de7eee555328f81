//! Query subsystem for nestdb
//!
//! Translates JSON-shaped query trees into sets of document ids by
//! composing hash-index probes with set algebra.
//!
//! # Evaluation Flow
//!
//! 1. Parse the JSON tree into a tagged [`QueryExpr`]
//! 2. Dispatch on expression shape: leaf operator, combinator, or identity
//! 3. Leaf operators probe one index partition under its reader lock
//! 4. Equality candidates are re-read and re-resolved to discard hash
//!    collisions; existence and range results trust the index
//! 5. Combinators recurse with transient accumulators and fold back
//!
//! # Invariants
//!
//! - Evaluation never mutates the collection
//! - At most one partition lock is held at any moment
//! - Errors abort the enclosing combinator; the accumulator is then
//!   unspecified

mod ast;
mod errors;
mod evaluator;
mod path;

pub use ast::QueryExpr;
pub use errors::{QueryError, QueryResult};
pub use evaluator::{IdSet, QueryEvaluator, QuerySource};
pub use path::resolve;
