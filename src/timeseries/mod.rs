//! # Time-Series Engine
//!
//! Timestamp-keyed record storage over bounded collections: the
//! external-timestamp to internal-key codec, the query-option model, and
//! the store itself.

pub mod codec;
pub mod errors;
pub mod query;
pub mod store;

pub use codec::{KeyCodec, SeriesKey, KEY_FIELD, TIMESTAMP_FIELD};
pub use errors::{StoreError, StoreResult};
pub use query::{AggregateType, QueryOptions, SortDirection};
pub use store::{TimeSeriesStore, WriteOutcome};
