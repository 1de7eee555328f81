//! # Collection Errors
//!
//! Error types for document storage and index management.

use thiserror::Error;

use crate::index::DocId;

/// Result type for collection operations
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Document storage and index management errors
#[derive(Debug, Clone, Error)]
pub enum CollectionError {
    /// No live document under this id
    #[error("document {id} does not exist")]
    NotFound { id: DocId },

    /// Documents must be JSON objects
    #[error("only JSON objects can be stored as documents")]
    NotAnObject,

    /// The path has no index to drop
    #[error("path {path} is not indexed")]
    UnknownIndex { path: String },

    /// The path is already indexed
    #[error("path {path} is already indexed")]
    DuplicateIndex { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_id() {
        let err = CollectionError::NotFound { id: 12 };
        assert!(err.to_string().contains("12"));
    }
}
