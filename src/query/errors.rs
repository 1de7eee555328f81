//! # Query Errors
//!
//! Error types for query parsing and evaluation. Every variant embeds the
//! printed form of the offending sub-expression so callers can correlate a
//! failure with the query fragment that produced it.

use thiserror::Error;

use crate::collection::CollectionError;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Query parsing and evaluation errors
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    // ==================
    // Invalid query structure
    // ==================
    /// Lookup or range operator without a lookup path
    #[error("missing lookup path `in` in query {query}")]
    MissingPath { query: String },

    /// Lookup path is not a vector of segments
    #[error("expecting a vector lookup path, but {query} given")]
    PathNotVector { query: String },

    /// `limit` modifier is not a number
    #[error("expecting `limit` as a number, but {query} given")]
    LimitNotNumeric { query: String },

    /// Range bound is not an integer
    #[error("expecting `{key}` as an integer, but {query} given")]
    BoundNotInteger { key: &'static str, query: String },

    /// Range operator without an upper bound
    #[error("missing `int-to` in query {query}")]
    MissingRangeEnd { query: String },

    /// Intersection or complement operand is not a vector of sub-queries
    #[error("expecting a vector of sub-queries, but {query} given")]
    SubQueriesNotVector { query: String },

    /// String node that is neither `"all"` nor a decimal document id
    #[error("{query} is not a document id")]
    InvalidDocId { query: String },

    /// Mapping node carrying none of the recognized operator keys
    #[error("query {query} does not contain any operation (lookup/union/intersection/etc)")]
    NoOperator { query: String },

    // ==================
    // Missing index
    // ==================
    /// The queried path has no index
    #[error("please index {path} and retry query {query}")]
    UnindexedPath { path: String, query: String },

    // ==================
    // Collaborator failures
    // ==================
    /// Surfaced collection failure
    #[error(transparent)]
    Collection(#[from] CollectionError),
}

impl QueryError {
    /// Returns true for structural problems in the query tree itself.
    pub fn is_invalid_query(&self) -> bool {
        !matches!(
            self,
            QueryError::UnindexedPath { .. } | QueryError::Collection(_)
        )
    }
}
