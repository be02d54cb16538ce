//! # Time-Series Store
//!
//! The generic engine over one bounded collection per owner:
//! insert-unique-by-timestamp, range and point reads, delete, and field
//! aggregation. The store never publishes change events itself; it
//! returns the stored record and leaves notification to its caller, so
//! storage and notification stay independently testable.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::registry::{Collection, CollectionOptions, CollectionRegistry, RegistryError};

use super::codec::{KeyCodec, SeriesKey};
use super::errors::{StoreError, StoreResult};
use super::query::{compare_fields, matches_filters, AggregateType, QueryOptions, SortDirection};

/// How many records a write matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub matched: u64,
}

impl WriteOutcome {
    pub fn matched(count: u64) -> Self {
        Self { matched: count }
    }
}

/// Timestamp-keyed record store over per-owner bounded collections.
///
/// Collections are addressed as `<prefix><ownerID>` and created lazily
/// with this store's capacity options on first insert.
#[derive(Debug)]
pub struct TimeSeriesStore {
    registry: Arc<CollectionRegistry<SeriesKey>>,
    prefix: String,
    series_options: CollectionOptions,
}

impl TimeSeriesStore {
    pub fn new(
        registry: Arc<CollectionRegistry<SeriesKey>>,
        prefix: impl Into<String>,
        series_options: CollectionOptions,
    ) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
            series_options,
        }
    }

    /// Collection name backing `owner`'s series.
    pub fn collection_name(&self, owner: &str) -> String {
        format!("{}{}", self.prefix, owner)
    }

    fn series(&self, owner: &str) -> StoreResult<Arc<Collection<SeriesKey>>> {
        Ok(self
            .registry
            .create_or_open(&self.collection_name(owner), self.series_options.clone())?)
    }

    /// Insert one record into `owner`'s series.
    ///
    /// The record must carry an integer `timestamp` and no internal key
    /// field; a second record at an already-present timestamp fails with
    /// [`StoreError::DuplicateKey`]. Returns the stored record in
    /// external form.
    pub fn insert(&self, owner: &str, record: Value) -> StoreResult<Value> {
        let (key, stored) = KeyCodec::encode(record)?;
        let series = self.series(owner)?;

        series
            .insert_unique(key, stored.clone())
            .map_err(|err| match err {
                RegistryError::DuplicateKey(_) => StoreError::DuplicateKey(key.as_millis()),
                other => StoreError::Registry(other),
            })?;

        debug!(collection = %series.name(), timestamp = key.as_millis(), "record inserted");
        KeyCodec::decode(stored)
    }

    /// Records in `[start, stop]`, sorted and limited per the options,
    /// each in external form.
    pub fn find(&self, owner: &str, options: &QueryOptions) -> StoreResult<Vec<Value>> {
        let series = self.series(owner)?;
        let direction = options.parsed_direction()?;
        let (start, stop) = self.bounds(options)?;

        if options.sorts_by_key() {
            let rows = series.range(
                Some(&start),
                Some(&stop),
                direction == SortDirection::Desc,
                options.parsed_limit(),
            )?;
            return rows
                .into_iter()
                .map(|(_, stored)| KeyCodec::decode(stored))
                .collect();
        }

        // Sorting on an arbitrary field: decode the whole range, then
        // order deterministically by that field's value.
        let field = options.sort.clone().unwrap_or_default();
        let rows = series.range(Some(&start), Some(&stop), false, None)?;
        let mut records = rows
            .into_iter()
            .map(|(_, stored)| KeyCodec::decode(stored))
            .collect::<StoreResult<Vec<_>>>()?;
        records.sort_by(|a, b| {
            let ordering = compare_fields(a.get(&field), b.get(&field));
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        if let Some(limit) = options.parsed_limit() {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// At most one record under the same filtering; `Ok(None)` when
    /// nothing matches, since "no data yet" is a normal case.
    pub fn find_one(&self, owner: &str, options: &QueryOptions) -> StoreResult<Option<Value>> {
        let mut options = options.clone();
        options.limit = Some(1);
        Ok(self.find(owner, &options)?.into_iter().next())
    }

    /// Remove the record at `options.timestamp`. Deleting an absent
    /// timestamp matches zero records; it is not an error.
    pub fn delete_one(&self, owner: &str, options: &QueryOptions) -> StoreResult<WriteOutcome> {
        let millis = options
            .timestamp
            .ok_or_else(|| StoreError::InvalidQuery("delete requires a timestamp".into()))?;
        let key = SeriesKey::from_millis(millis)?;

        let series = self.series(owner)?;
        let removed = series.remove(&key)?;
        Ok(WriteOutcome::matched(u64::from(removed.is_some())))
    }

    /// Apply `options.aggregate_type` over `field` across the records in
    /// `[start, stop]` whose `field` is non-null and which match the
    /// caller's filters. Returns `None` when nothing matches, except
    /// `count`, which legitimately returns zero.
    pub fn aggregate(
        &self,
        owner: &str,
        field: &str,
        options: &QueryOptions,
    ) -> StoreResult<Option<Value>> {
        let operator = options.parsed_aggregate()?;
        let series = self.series(owner)?;
        let (start, stop) = self.bounds(options)?;

        let rows = series.range(Some(&start), Some(&stop), false, None)?;
        let mut matched = Vec::new();
        for (_, stored) in rows {
            let record = KeyCodec::decode(stored)?;
            let value = record.get(field);
            if value.is_none() || value.is_some_and(Value::is_null) {
                continue;
            }
            if !matches_filters(&record, &options.filters) {
                continue;
            }
            matched.push(record);
        }

        if operator == AggregateType::Count {
            return Ok(Some(Value::Number(matched.len().into())));
        }

        // The numeric operators fold over the numeric values of `field`;
        // non-numeric values are skipped.
        let numeric: Vec<(f64, &Value)> = matched
            .iter()
            .filter_map(|record| {
                let value = record.get(field)?;
                Some((value.as_f64()?, value))
            })
            .collect();
        if numeric.is_empty() {
            return Ok(None);
        }

        let scalar = match operator {
            AggregateType::Min => numeric
                .iter()
                .reduce(|a, b| if b.0 < a.0 { b } else { a })
                .map(|(_, value)| (*value).clone()),
            AggregateType::Max => numeric
                .iter()
                .reduce(|a, b| if b.0 > a.0 { b } else { a })
                .map(|(_, value)| (*value).clone()),
            AggregateType::Sum => {
                let sum: f64 = numeric.iter().map(|(n, _)| n).sum();
                serde_json::Number::from_f64(sum).map(Value::Number)
            }
            AggregateType::Avg => {
                let sum: f64 = numeric.iter().map(|(n, _)| n).sum();
                serde_json::Number::from_f64(sum / numeric.len() as f64).map(Value::Number)
            }
            AggregateType::Count => unreachable!("handled above"),
        };
        Ok(scalar)
    }

    /// Drop `owner`'s whole series. Returns whether it existed.
    pub fn drop_series(&self, owner: &str) -> StoreResult<bool> {
        Ok(self.registry.drop_collection(&self.collection_name(owner))?)
    }

    /// Inclusive key bounds for a query: a point lookup collapses the
    /// range; otherwise start defaults to the beginning of time and stop
    /// to now.
    fn bounds(&self, options: &QueryOptions) -> StoreResult<(SeriesKey, SeriesKey)> {
        if let Some(millis) = options.timestamp {
            let key = SeriesKey::from_millis(millis)?;
            return Ok((key, key));
        }
        let start = match options.start {
            Some(millis) => SeriesKey::from_millis(millis)
                .map_err(|_| StoreError::InvalidQuery(format!("start {millis} out of range")))?,
            None => SeriesKey::min(),
        };
        let stop = match options.stop {
            Some(millis) => SeriesKey::from_millis(millis)
                .map_err(|_| StoreError::InvalidQuery(format!("stop {millis} out of range")))?,
            None => SeriesKey::now(),
        };
        Ok((start, stop))
    }
}
