//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The underlying store cannot be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The store handle has been closed.
    #[error("store is closed")]
    Closed,

    /// The record violates a store invariant.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    /// Returns true if the failure is infrastructural (callers see it as
    /// `StorageUnavailable`).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StoreError::Closed.is_unavailable());
        assert!(StoreError::Unavailable("down".into()).is_unavailable());
        assert!(!StoreError::InvalidRecord("self pair".into()).is_unavailable());
    }
}
