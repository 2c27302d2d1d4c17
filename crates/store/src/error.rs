//! Store error surface.
//!
//! Store operations return result values; none of the error variants are
//! used for control flow. The `code()` strings are the stable identifiers
//! surfaced to front-end collaborators.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by store operations.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("store is not initialized: {0}")]
    NotInitialized(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The ANN side-index is not available; durable vector writes still
    /// succeed while nearest-neighbor search does not.
    #[error("vector search is unavailable")]
    VecUnavailable,

    #[error("vector side-index sync failed: {0}")]
    VecSyncFailed(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Stable identifier for collaborators.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotInitialized(_) => "NOT_INITIALIZED",
            StoreError::QueryFailed(_) => "QUERY_FAILED",
            StoreError::Validation(_) => "VALIDATION",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::VecUnavailable => "VEC_UNAVAILABLE",
            StoreError::VecSyncFailed(_) => "VEC_SYNC_FAILED",
            StoreError::Internal(_) => "INTERNAL",
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, StoreError::QueryFailed(_) | StoreError::VecSyncFailed(_))
    }

    pub(crate) fn query<E: std::fmt::Display>(err: E) -> Self {
        StoreError::QueryFailed(err.to_string())
    }

    pub(crate) fn internal<E: std::fmt::Display>(err: E) -> Self {
        StoreError::Internal(err.to_string())
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        StoreError::NotInitialized(err.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::query(err)
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::query(err)
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::query(err)
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::query(err)
    }
}

impl From<bincode::error::EncodeError> for StoreError {
    fn from(err: bincode::error::EncodeError) -> Self {
        StoreError::internal(err)
    }
}

impl From<bincode::error::DecodeError> for StoreError {
    fn from(err: bincode::error::DecodeError) -> Self {
        StoreError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(StoreError::VecUnavailable.code(), "VEC_UNAVAILABLE");
        assert_eq!(StoreError::Validation("x".into()).code(), "VALIDATION");
        assert_eq!(StoreError::NotFound("x".into()).code(), "NOT_FOUND");
    }

    #[test]
    fn sync_failures_are_retryable() {
        assert!(StoreError::VecSyncFailed("net".into()).retryable());
        assert!(!StoreError::Validation("bad".into()).retryable());
    }
}
