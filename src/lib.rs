//! nestdb - an embedded, schemaless JSON document database engine
//!
//! Documents are JSON object trees stored in collections; partitioned hash
//! indexes over attribute paths accelerate equality, existence, and integer
//! range queries composed with set algebra.

pub mod collection;
pub mod index;
pub mod observability;
pub mod query;
