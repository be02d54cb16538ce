//! # Platform Catalog
//!
//! Platforms are assets whose position history is itself a stream: each
//! platform metadata row carries a `location` field referencing the
//! stream holding its location records. The binding is immutable after
//! creation; deleting a platform cascades to the location stream on a
//! best-effort basis.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pubsub::{EventBus, LocationInserted, LOCATION_INSERTED};
use crate::registry::{Collection, CollectionOptions, CollectionRegistry};
use crate::timeseries::{QueryOptions, WriteOutcome};

use super::errors::{CatalogError, CatalogResult};
use super::stream::{into_metadata, name_of, parse_id, StreamCatalog};

/// Metadata collection backing all platforms
pub const PLATFORMS_COLLECTION: &str = "platforms";

/// Reserved field binding a platform to its location stream
pub const LOCATION_FIELD: &str = "location";

/// Catalog of platforms and their location-history series.
#[derive(Debug)]
pub struct PlatformCatalog {
    metadata: Arc<Collection<String>>,
    streams: Arc<StreamCatalog>,
    bus: Arc<EventBus>,
}

impl PlatformCatalog {
    /// Open the platform catalog over its metadata collection. Location
    /// storage delegates to the stream catalog, so a platform's location
    /// series is an ordinary packet series.
    pub fn new(
        metadata_registry: &CollectionRegistry<String>,
        streams: Arc<StreamCatalog>,
        bus: Arc<EventBus>,
    ) -> CatalogResult<Self> {
        let metadata = metadata_registry
            .create_or_open(PLATFORMS_COLLECTION, CollectionOptions::unbounded())?;
        Ok(Self {
            metadata,
            streams,
            bus,
        })
    }

    /// Create a platform. When the caller supplies no `location`, a
    /// fresh stream is created first to hold the location history. The
    /// two writes are not atomic; a crash between them leaves an orphan
    /// stream, which is harmless and never referenced.
    pub fn create_platform(&self, metadata: Value) -> CatalogResult<Value> {
        let mut fields = into_metadata(metadata)?;
        if fields.contains_key("id") {
            return Err(CatalogError::IdNotAllowed);
        }
        if let Some(name) = name_of(&fields)? {
            self.assert_name_free(name, None)?;
        }
        match fields.get(LOCATION_FIELD) {
            None | Some(Value::Null) => {
                let location = self.streams.create_stream(Value::Object(Default::default()))?;
                let location_id = location["id"].clone();
                fields.insert(LOCATION_FIELD.to_string(), location_id);
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(CatalogError::InvalidMetadata(format!(
                    "location must be a stream id, got {other}"
                )))
            }
        }

        let id = Uuid::new_v4().to_string();
        fields.insert("id".to_string(), Value::String(id.clone()));
        let stored = Value::Object(fields);
        self.metadata.insert_unique(id.clone(), stored.clone())?;

        debug!(platform = %id, "platform created");
        Ok(stored)
    }

    /// Metadata rows matching the options' filters, in id order.
    pub fn find_platforms(&self, options: &QueryOptions) -> CatalogResult<Vec<Value>> {
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

    /// One platform's metadata; `Ok(None)` when well-formed but absent.
    pub fn find_platform(&self, id: &str) -> CatalogResult<Option<Value>> {
        let id = parse_id(id)?;
        Ok(self.metadata.get(&id)?)
    }

    /// Update a platform's metadata. `id` and `location` are immutable
    /// through this call and are stripped from the applied update; an
    /// embedded id must agree with the target. Updating an absent
    /// platform matches zero records.
    pub fn update_platform(&self, id: &str, metadata: Value) -> CatalogResult<WriteOutcome> {
        let id = parse_id(id)?;
        let mut fields = into_metadata(metadata)?;

        let Some(existing) = self.metadata.get(&id)? else {
            return Ok(WriteOutcome::matched(0));
        };

        if let Some(embedded) = fields.get("id") {
            let embedded = embedded.as_str().unwrap_or_default();
            if parse_id(embedded).ok().as_deref() != Some(id.as_str()) {
                return Err(CatalogError::IdMismatch {
                    embedded: embedded.to_string(),
                    target: id,
                });
            }
        }
        if let Some(name) = name_of(&fields)? {
            self.assert_name_free(name, Some(&id))?;
        }
        fields.remove("id");
        fields.remove(LOCATION_FIELD);

        let mut merged = match existing {
            Value::Object(fields) => fields,
            _ => Default::default(),
        };
        for (field, value) in fields {
            merged.insert(field, value);
        }
        self.metadata.replace(&id, Value::Object(merged))?;
        Ok(WriteOutcome::matched(1))
    }

    /// Delete a platform and, best-effort, its location stream. The
    /// outcome reports metadata deletion only; a failed cascade is
    /// logged and otherwise ignored. Deleting an absent platform matches
    /// zero records.
    pub fn delete_platform(&self, id: &str) -> CatalogResult<WriteOutcome> {
        let id = parse_id(id)?;
        let Some(row) = self.metadata.remove(&id)? else {
            return Ok(WriteOutcome::matched(0));
        };

        if let Some(location_id) = row.get(LOCATION_FIELD).and_then(Value::as_str) {
            if let Err(err) = self.streams.delete_stream(location_id) {
                warn!(platform = %id, location = %location_id, %err,
                    "failed to delete location stream");
            }
        }

        debug!(platform = %id, "platform deleted");
        Ok(WriteOutcome::matched(1))
    }

    /// Insert a location record for a platform and notify subscribers on
    /// [`LOCATION_INSERTED`].
    pub fn insert_location(&self, id: &str, record: Value) -> CatalogResult<Value> {
        let (platform_id, location_id) = self.location_stream(id)?;
        let stored = self.streams.store().insert(&location_id, record)?;

        let event = LocationInserted::new(platform_id, stored.clone());
        self.bus.publish(LOCATION_INSERTED, &event.to_payload());
        Ok(stored)
    }

    /// Range/point read over a platform's location history.
    pub fn find_locations(&self, id: &str, options: &QueryOptions) -> CatalogResult<Vec<Value>> {
        let (_, location_id) = self.location_stream(id)?;
        Ok(self.streams.store().find(&location_id, options)?)
    }

    /// At most one location record; `Ok(None)` when nothing matches.
    pub fn find_location(&self, id: &str, options: &QueryOptions) -> CatalogResult<Option<Value>> {
        let (_, location_id) = self.location_stream(id)?;
        Ok(self.streams.store().find_one(&location_id, options)?)
    }

    /// Delete the location record at `options.timestamp`.
    pub fn delete_location(&self, id: &str, options: &QueryOptions) -> CatalogResult<WriteOutcome> {
        let (_, location_id) = self.location_stream(id)?;
        Ok(self.streams.store().delete_one(&location_id, options)?)
    }

    /// Resolve a platform id to its location stream id; unknown
    /// platforms are [`CatalogError::NoSuchId`] since location calls
    /// cannot proceed without the binding.
    fn location_stream(&self, id: &str) -> CatalogResult<(String, String)> {
        let id = parse_id(id)?;
        let row = self
            .metadata
            .get(&id)?
            .ok_or_else(|| CatalogError::NoSuchId(id.clone()))?;
        let location_id = row
            .get(LOCATION_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CatalogError::InvalidMetadata(format!("platform {id} has no location binding"))
            })?;
        Ok((id.clone(), location_id.to_string()))
    }

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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::TimeSeriesStore;
    use serde_json::json;

    struct Fixture {
        platforms: PlatformCatalog,
        streams: Arc<StreamCatalog>,
        bus: Arc<EventBus>,
    }

    fn fixture() -> Fixture {
        let metadata_registry = CollectionRegistry::new();
        let store = Arc::new(TimeSeriesStore::new(
            Arc::new(CollectionRegistry::new()),
            "packets_",
            CollectionOptions::unbounded(),
        ));
        let bus = Arc::new(EventBus::new());
        let streams = Arc::new(
            StreamCatalog::new(&metadata_registry, store, Arc::clone(&bus)).unwrap(),
        );
        let platforms = PlatformCatalog::new(
            &metadata_registry,
            Arc::clone(&streams),
            Arc::clone(&bus),
        )
        .unwrap();
        Fixture {
            platforms,
            streams,
            bus,
        }
    }

    #[test]
    fn test_create_platform_builds_location_stream() {
        let fx = fixture();
        let platform = fx.platforms.create_platform(json!({"name": "rover"})).unwrap();

        let location_id = platform["location"].as_str().unwrap();
        let stream = fx.streams.find_stream(location_id).unwrap();
        assert!(stream.is_some(), "location stream must exist");

        // Fresh stream is empty
        let records = fx
            .platforms
            .find_locations(platform["id"].as_str().unwrap(), &QueryOptions::default())
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_create_platform_keeps_supplied_location() {
        let fx = fixture();
        let stream = fx.streams.create_stream(json!({})).unwrap();
        let stream_id = stream["id"].as_str().unwrap();

        let platform = fx
            .platforms
            .create_platform(json!({"location": stream_id}))
            .unwrap();
        assert_eq!(platform["location"], *stream_id);
    }

    #[test]
    fn test_update_strips_location_and_id() {
        let fx = fixture();
        let platform = fx.platforms.create_platform(json!({"name": "rover"})).unwrap();
        let id = platform["id"].as_str().unwrap();
        let location = platform["location"].clone();

        let outcome = fx
            .platforms
            .update_platform(id, json!({"name": "rover2", "location": "hijack", "id": id}))
            .unwrap();
        assert_eq!(outcome.matched, 1);

        let updated = fx.platforms.find_platform(id).unwrap().unwrap();
        assert_eq!(updated["name"], "rover2");
        assert_eq!(updated["location"], location, "location is immutable");
        assert_eq!(updated["id"], *id);
    }

    #[test]
    fn test_update_rejects_mismatched_embedded_id() {
        let fx = fixture();
        let platform = fx.platforms.create_platform(json!({})).unwrap();
        let id = platform["id"].as_str().unwrap();

        let other = Uuid::new_v4().to_string();
        let err = fx
            .platforms
            .update_platform(id, json!({"id": other}))
            .unwrap_err();
        assert!(matches!(err, CatalogError::IdMismatch { .. }));
    }

    #[test]
    fn test_update_rejects_name_of_other_platform() {
        let fx = fixture();
        fx.platforms.create_platform(json!({"name": "a"})).unwrap();
        let platform = fx.platforms.create_platform(json!({"name": "b"})).unwrap();
        let id = platform["id"].as_str().unwrap();

        let err = fx
            .platforms
            .update_platform(id, json!({"name": "a"}))
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateName(_)));

        // Keeping its own name is fine
        fx.platforms.update_platform(id, json!({"name": "b"})).unwrap();
    }

    #[test]
    fn test_delete_platform_cascades_to_location_stream() {
        let fx = fixture();
        let platform = fx.platforms.create_platform(json!({})).unwrap();
        let id = platform["id"].as_str().unwrap();
        let location_id = platform["location"].as_str().unwrap().to_string();

        let outcome = fx.platforms.delete_platform(id).unwrap();
        assert_eq!(outcome.matched, 1);
        assert_eq!(fx.platforms.find_platform(id).unwrap(), None);
        assert_eq!(fx.streams.find_stream(&location_id).unwrap(), None);

        // Idempotent delete
        assert_eq!(fx.platforms.delete_platform(id).unwrap().matched, 0);
    }

    #[test]
    fn test_location_round_trip_and_publish() {
        let fx = fixture();
        let platform = fx.platforms.create_platform(json!({})).unwrap();
        let id = platform["id"].as_str().unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        fx.bus.subscribe(LOCATION_INSERTED, move |payload| {
            sink.lock().unwrap().push(payload.clone());
        });

        fx.platforms
            .insert_location(id, json!({"timestamp": 1000, "lat": 51.5}))
            .unwrap();

        let record = fx.platforms.find_location(id, &QueryOptions::at(1000)).unwrap();
        assert_eq!(record, Some(json!({"timestamp": 1000, "lat": 51.5})));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["platformID"], *id);
        assert_eq!(seen[0]["locationRecord"]["lat"], 51.5);
    }

    #[test]
    fn test_location_calls_on_unknown_platform() {
        let fx = fixture();

        let err = fx
            .platforms
            .insert_location("nonsense", json!({"timestamp": 1}))
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidId(_)));

        let absent = Uuid::new_v4().to_string();
        let err = fx
            .platforms
            .insert_location(&absent, json!({"timestamp": 1}))
            .unwrap_err();
        assert!(matches!(err, CatalogError::NoSuchId(_)));
    }
}
