//! # Catalog Errors
//!
//! Malformed ids, absent entities and name collisions are distinct
//! kinds: a malformed id is a caller error, while a well-formed but
//! absent id is an empty result (or [`CatalogError::NoSuchId`] where the
//! operation cannot proceed without the entity).

use thiserror::Error;

use crate::registry::RegistryError;
use crate::timeseries::StoreError;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Stream and platform catalog errors
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Id does not parse as an id at all
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Well-formed id, but no such entity exists
    #[error("No such id: {0}")]
    NoSuchId(String),

    /// Create calls assign ids; callers must not supply one
    #[error("Metadata must not carry an id on create")]
    IdNotAllowed,

    /// Embedded metadata id disagrees with the id being updated
    #[error("Embedded id {embedded} does not match target id {target}")]
    IdMismatch { embedded: String, target: String },

    /// Another entity already uses this name
    #[error("Name already in use: {0}")]
    DuplicateName(String),

    /// Metadata is not the shape the catalog accepts
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Series storage failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Metadata collection failure
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
