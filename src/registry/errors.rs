//! # Registry Errors
//!
//! Error types for collection lifecycle and storage access.

use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry and collection errors
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Malformed collection options supplied at creation
    #[error("Invalid collection options: {0}")]
    InvalidOptions(String),

    /// A record with this key already exists in the collection
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The backing store is unusable for this call
    #[error("Storage backend unavailable: {0}")]
    Backend(String),
}

impl RegistryError {
    /// Error used when a lock guarding shared storage state is poisoned.
    pub(crate) fn poisoned() -> Self {
        RegistryError::Backend("lock poisoned".into())
    }
}
