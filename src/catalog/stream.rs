//! # Stream Catalog
//!
//! Stream metadata lifecycle plus the per-stream packet series. A stream
//! is a metadata row with an assigned id, an optional unique name and
//! arbitrary further fields; its packet collection is created lazily by
//! the registry on first insert, so a stream may exist with no backing
//! collection at all.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::pubsub::{EventBus, PacketInserted, PACKET_INSERTED};
use crate::registry::{Collection, CollectionOptions, CollectionRegistry};
use crate::timeseries::{QueryOptions, TimeSeriesStore, WriteOutcome};

use super::errors::{CatalogError, CatalogResult};

/// Metadata collection backing all streams
pub const STREAMS_COLLECTION: &str = "streams";

/// Parse and normalize an opaque id, distinguishing malformed from
/// absent: malformed ids fail here, absent ones surface later as empty
/// results.
pub(crate) fn parse_id(id: &str) -> CatalogResult<String> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.to_string())
        .map_err(|_| CatalogError::InvalidId(id.to_string()))
}

pub(crate) fn into_metadata(value: Value) -> CatalogResult<Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(CatalogError::InvalidMetadata(format!(
            "expected an object, got {other}"
        ))),
    }
}

pub(crate) fn name_of(metadata: &Map<String, Value>) -> CatalogResult<Option<&str>> {
    match metadata.get("name") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(name)),
        Some(other) => Err(CatalogError::InvalidMetadata(format!(
            "name must be a string, got {other}"
        ))),
    }
}

/// Catalog of streams and their packet series.
#[derive(Debug)]
pub struct StreamCatalog {
    metadata: Arc<Collection<String>>,
    store: Arc<TimeSeriesStore>,
    bus: Arc<EventBus>,
}

impl StreamCatalog {
    /// Open the stream catalog over its metadata collection.
    pub fn new(
        metadata_registry: &CollectionRegistry<String>,
        store: Arc<TimeSeriesStore>,
        bus: Arc<EventBus>,
    ) -> CatalogResult<Self> {
        let metadata =
            metadata_registry.create_or_open(STREAMS_COLLECTION, CollectionOptions::unbounded())?;
        Ok(Self {
            metadata,
            store,
            bus,
        })
    }

    /// Create a stream: assigns the id, enforces optional-name
    /// uniqueness, returns the stored metadata. The packet collection is
    /// not created here.
    pub fn create_stream(&self, metadata: Value) -> CatalogResult<Value> {
        let mut fields = into_metadata(metadata)?;
        if fields.contains_key("id") {
            return Err(CatalogError::IdNotAllowed);
        }
        if let Some(name) = name_of(&fields)? {
            self.assert_name_free(name, None)?;
        }

        let id = Uuid::new_v4().to_string();
        fields.insert("id".to_string(), Value::String(id.clone()));
        let stored = Value::Object(fields);
        self.metadata.insert_unique(id.clone(), stored.clone())?;

        debug!(stream = %id, "stream created");
        Ok(stored)
    }

    /// Metadata rows matching the options' filters, in id order.
    pub fn find_streams(&self, options: &QueryOptions) -> CatalogResult<Vec<Value>> {
        let mut rows: Vec<Value> = self
            .metadata
            .scan()?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| crate::timeseries::query::matches_filters(row, &options.filters))
            .collect();
        if let Some(limit) = options.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    /// One stream's metadata; `Ok(None)` when the id is well-formed but
    /// absent.
    pub fn find_stream(&self, id: &str) -> CatalogResult<Option<Value>> {
        let id = parse_id(id)?;
        Ok(self.metadata.get(&id)?)
    }

    /// Delete a stream's metadata and drop its packet collection.
    /// Deleting an absent stream matches zero records.
    pub fn delete_stream(&self, id: &str) -> CatalogResult<WriteOutcome> {
        let id = parse_id(id)?;
        let removed = self.metadata.remove(&id)?;
        self.store.drop_series(&id)?;
        Ok(WriteOutcome::matched(u64::from(removed.is_some())))
    }

    /// Insert a packet into a stream's series and notify subscribers on
    /// [`PACKET_INSERTED`].
    pub fn insert_packet(&self, stream_id: &str, packet: Value) -> CatalogResult<Value> {
        let stream_id = parse_id(stream_id)?;
        let stored = self.store.insert(&stream_id, packet)?;

        let event = PacketInserted::new(stream_id, stored.clone());
        self.bus.publish(PACKET_INSERTED, &event.to_payload());
        Ok(stored)
    }

    /// Range/point read over a stream's packets.
    pub fn find_packets(&self, stream_id: &str, options: &QueryOptions) -> CatalogResult<Vec<Value>> {
        let stream_id = parse_id(stream_id)?;
        Ok(self.store.find(&stream_id, options)?)
    }

    /// At most one packet; `Ok(None)` when nothing matches.
    pub fn find_packet(
        &self,
        stream_id: &str,
        options: &QueryOptions,
    ) -> CatalogResult<Option<Value>> {
        let stream_id = parse_id(stream_id)?;
        Ok(self.store.find_one(&stream_id, options)?)
    }

    /// Delete the packet at `options.timestamp`.
    pub fn delete_packet(
        &self,
        stream_id: &str,
        options: &QueryOptions,
    ) -> CatalogResult<WriteOutcome> {
        let stream_id = parse_id(stream_id)?;
        Ok(self.store.delete_one(&stream_id, options)?)
    }

    /// Aggregate over one field of a stream's packets.
    pub fn aggregate_packets(
        &self,
        stream_id: &str,
        field: &str,
        options: &QueryOptions,
    ) -> CatalogResult<Option<Value>> {
        let stream_id = parse_id(stream_id)?;
        Ok(self.store.aggregate(&stream_id, field, options)?)
    }

    /// Name uniqueness by metadata scan; `exclude_id` skips the entity
    /// being updated.
    fn assert_name_free(&self, name: &str, exclude_id: Option<&str>) -> CatalogResult<()> {
        for (id, row) in self.metadata.scan()? {
            if exclude_id == Some(id.as_str()) {
                continue;
            }
            if row.get("name").and_then(Value::as_str) == Some(name) {
                return Err(CatalogError::DuplicateName(name.to_string()));
            }
        }
        Ok(())
    }

    pub(crate) fn store(&self) -> &Arc<TimeSeriesStore> {
        &self.store
    }
}
