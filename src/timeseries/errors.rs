//! # Time-Series Store Errors

use thiserror::Error;

use crate::registry::RegistryError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Time-series store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Record carries no `timestamp` field
    #[error("Record has no timestamp field")]
    MissingTimestamp,

    /// Record already carries the internal ordering-key field
    #[error("Record must not carry the internal key field `{0}`")]
    ReservedKeyField(&'static str),

    /// Timestamp value is not a representable epoch-millisecond integer
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Record is not the shape the store accepts
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A record at this timestamp already exists in the series
    #[error("Duplicate key: a record at timestamp {0} already exists")]
    DuplicateKey(i64),

    /// Malformed query options
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Collection-level failure (backend unavailable, bad options)
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
