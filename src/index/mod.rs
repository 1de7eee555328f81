//! Hash index subsystem for nestdb
//!
//! Secondary indexes are in-memory multimaps from hashed attribute values to
//! document ids, sharded into partitions with one read-write lock each.
//!
//! # Design Principles
//!
//! - Derived state: indexes mirror the document store, never the source of
//!   truth
//! - Probabilistic by construction: entries are keyed by hash, so readers
//!   that need exactness must re-verify against the document
//! - One partition lock at a time, on both the read and write side
//!
//! # Invariants
//!
//! - A document holding value `v` at an indexed path appears in that index
//!   under `str_hash(canonical_str(v))`
//! - Placement is `key % num_parts`; partition count is fixed at creation

mod hashing;
mod partitioned;

pub use hashing::{canonical_str, join_path, str_hash, PATH_SEP};
pub use partitioned::{DocId, IndexPartition, PartitionedIndex};
