//! # Catalogs
//!
//! Stream and platform metadata lifecycle over the time-series engine.
//! Catalogs own the publish side of change notification: a successful
//! insert through a catalog is what produces an event, never the store
//! itself.

pub mod errors;
pub mod platform;
pub mod stream;

pub use errors::{CatalogError, CatalogResult};
pub use platform::{PlatformCatalog, LOCATION_FIELD, PLATFORMS_COLLECTION};
pub use stream::{StreamCatalog, STREAMS_COLLECTION};
