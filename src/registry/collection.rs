//! # Bounded Collections
//!
//! A collection is one named, key-ordered map of records. Collections may
//! carry a record-count cap and/or an approximate byte-size cap fixed at
//! creation; once a cap is active, the oldest records (lowest keys) are
//! evicted as new ones arrive. Eviction is transparent: it is never
//! notified and cannot be triggered by callers.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use super::errors::{RegistryError, RegistryResult};

/// Capacity bounds for a collection, fixed at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Maximum number of resident records
    pub max_records: Option<usize>,

    /// Maximum approximate resident size in bytes
    pub max_bytes: Option<usize>,
}

impl CollectionOptions {
    /// Unbounded collection
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Collection capped to `max_records` records
    pub fn capped(max_records: usize) -> Self {
        Self {
            max_records: Some(max_records),
            max_bytes: None,
        }
    }

    /// A zero cap would reject every insert, so it is a caller error.
    pub(crate) fn validate(&self) -> RegistryResult<()> {
        if self.max_records == Some(0) {
            return Err(RegistryError::InvalidOptions(
                "max_records must be at least 1".into(),
            ));
        }
        if self.max_bytes == Some(0) {
            return Err(RegistryError::InvalidOptions(
                "max_bytes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A named, optionally bounded map of keys to records.
///
/// Keys are kept in their natural order; that order is the collection's
/// total order for range reads and for oldest-first eviction.
#[derive(Debug)]
pub struct Collection<K: Ord> {
    name: String,
    options: CollectionOptions,
    inner: RwLock<Inner<K>>,
}

#[derive(Debug)]
struct Inner<K: Ord> {
    records: BTreeMap<K, Value>,
    resident_bytes: usize,
}

impl<K: Ord + Clone + fmt::Display> Collection<K> {
    pub(crate) fn new(name: impl Into<String>, options: CollectionOptions) -> Self {
        Self {
            name: name.into(),
            options,
            inner: RwLock::new(Inner {
                records: BTreeMap::new(),
                resident_bytes: 0,
            }),
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bounds this collection was created with
    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Insert a record under a key that must not already be present.
    ///
    /// On success, evicts lowest-keyed records while either cap is
    /// exceeded.
    pub fn insert_unique(&self, key: K, value: Value) -> RegistryResult<()> {
        let size = approximate_size(&value);
        let mut inner = self.inner.write().map_err(|_| RegistryError::poisoned())?;

        if inner.records.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key.to_string()));
        }

        inner.records.insert(key, value);
        inner.resident_bytes += size;

        let mut evicted = 0usize;
        while self.over_capacity(&inner) && inner.records.len() > 1 {
            if let Some((_, old)) = inner.records.pop_first() {
                inner.resident_bytes = inner.resident_bytes.saturating_sub(approximate_size(&old));
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(collection = %self.name, evicted, "evicted oldest records over cap");
        }

        Ok(())
    }

    fn over_capacity(&self, inner: &Inner<K>) -> bool {
        if let Some(max) = self.options.max_records {
            if inner.records.len() > max {
                return true;
            }
        }
        if let Some(max) = self.options.max_bytes {
            if inner.resident_bytes > max {
                return true;
            }
        }
        false
    }

    /// Read the record at `key`, if present.
    pub fn get(&self, key: &K) -> RegistryResult<Option<Value>> {
        let inner = self.inner.read().map_err(|_| RegistryError::poisoned())?;
        Ok(inner.records.get(key).cloned())
    }

    /// Read records with keys in `[start, stop]` (either bound optional),
    /// in key order, descending when requested, up to `limit` records.
    pub fn range(
        &self,
        start: Option<&K>,
        stop: Option<&K>,
        descending: bool,
        limit: Option<usize>,
    ) -> RegistryResult<Vec<(K, Value)>> {
        // An inverted window matches nothing; BTreeMap::range would panic.
        if let (Some(start), Some(stop)) = (start, stop) {
            if start > stop {
                return Ok(Vec::new());
            }
        }

        let inner = self.inner.read().map_err(|_| RegistryError::poisoned())?;

        let lower = start.map_or(Bound::Unbounded, |k| Bound::Included(k.clone()));
        let upper = stop.map_or(Bound::Unbounded, |k| Bound::Included(k.clone()));
        let iter = inner
            .records
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()));

        let limit = limit.unwrap_or(usize::MAX);
        let rows = if descending {
            iter.rev().take(limit).collect()
        } else {
            iter.take(limit).collect()
        };
        Ok(rows)
    }

    /// Remove and return the record at `key`. Absent keys match nothing.
    pub fn remove(&self, key: &K) -> RegistryResult<Option<Value>> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::poisoned())?;
        let removed = inner.records.remove(key);
        if let Some(value) = &removed {
            inner.resident_bytes = inner.resident_bytes.saturating_sub(approximate_size(value));
        }
        Ok(removed)
    }

    /// Replace the record at an existing key. Returns false if absent.
    pub fn replace(&self, key: &K, value: Value) -> RegistryResult<bool> {
        let size = approximate_size(&value);
        let mut inner = self.inner.write().map_err(|_| RegistryError::poisoned())?;
        match inner.records.get_mut(key) {
            Some(slot) => {
                let old = approximate_size(slot);
                *slot = value;
                inner.resident_bytes = inner.resident_bytes.saturating_sub(old) + size;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All resident records in key order.
    pub fn scan(&self) -> RegistryResult<Vec<(K, Value)>> {
        let inner = self.inner.read().map_err(|_| RegistryError::poisoned())?;
        Ok(inner
            .records
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Number of resident records
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.records.len()).unwrap_or(0)
    }

    /// True when no records are resident
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Approximate serialized size of a record, used for byte caps.
fn approximate_size(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let col: Collection<u64> = Collection::new("test", CollectionOptions::unbounded());
        col.insert_unique(1, json!({"x": 1})).unwrap();

        assert_eq!(col.get(&1).unwrap(), Some(json!({"x": 1})));
        assert_eq!(col.get(&2).unwrap(), None);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let col: Collection<u64> = Collection::new("test", CollectionOptions::unbounded());
        col.insert_unique(1, json!({"x": 1})).unwrap();

        let err = col.insert_unique(1, json!({"x": 2})).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateKey(_)));

        // First record survives
        assert_eq!(col.get(&1).unwrap(), Some(json!({"x": 1})));
    }

    #[test]
    fn test_record_cap_evicts_oldest() {
        let col: Collection<u64> = Collection::new("test", CollectionOptions::capped(3));
        for key in 1..=5u64 {
            col.insert_unique(key, json!({"k": key})).unwrap();
        }

        assert_eq!(col.len(), 3);
        assert_eq!(col.get(&1).unwrap(), None);
        assert_eq!(col.get(&2).unwrap(), None);
        assert!(col.get(&3).unwrap().is_some());
        assert!(col.get(&5).unwrap().is_some());
    }

    #[test]
    fn test_byte_cap_evicts_oldest() {
        let options = CollectionOptions {
            max_records: None,
            max_bytes: Some(64),
        };
        let col: Collection<u64> = Collection::new("test", options);
        for key in 1..=10u64 {
            col.insert_unique(key, json!({"payload": "0123456789"})).unwrap();
        }

        assert!(col.len() < 10);
        // The newest record is always kept
        assert!(col.get(&10).unwrap().is_some());
        assert_eq!(col.get(&1).unwrap(), None);
    }

    #[test]
    fn test_range_inclusive_bounds() {
        let col: Collection<u64> = Collection::new("test", CollectionOptions::unbounded());
        for key in 1..=5u64 {
            col.insert_unique(key, json!({"k": key})).unwrap();
        }

        let rows = col.range(Some(&2), Some(&4), false, None).unwrap();
        let keys: Vec<u64> = rows.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![2, 3, 4]);

        let rows = col.range(Some(&2), Some(&4), true, Some(2)).unwrap();
        let keys: Vec<u64> = rows.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![4, 3]);
    }

    #[test]
    fn test_inverted_range_matches_nothing() {
        let col: Collection<u64> = Collection::new("test", CollectionOptions::unbounded());
        for key in 1..=5u64 {
            col.insert_unique(key, json!({"k": key})).unwrap();
        }

        assert!(col.range(Some(&4), Some(&2), false, None).unwrap().is_empty());
        assert!(col.range(Some(&9), Some(&7), true, Some(1)).unwrap().is_empty());
    }

    #[test]
    fn test_remove_absent_matches_nothing() {
        let col: Collection<u64> = Collection::new("test", CollectionOptions::unbounded());
        assert_eq!(col.remove(&42).unwrap(), None);
    }

    #[test]
    fn test_replace() {
        let col: Collection<u64> = Collection::new("test", CollectionOptions::unbounded());
        col.insert_unique(1, json!({"x": 1})).unwrap();

        assert!(col.replace(&1, json!({"x": 2})).unwrap());
        assert_eq!(col.get(&1).unwrap(), Some(json!({"x": 2})));
        assert!(!col.replace(&2, json!({})).unwrap());
    }

    #[test]
    fn test_zero_cap_is_invalid() {
        assert!(CollectionOptions::capped(0).validate().is_err());
        assert!(CollectionOptions::capped(1).validate().is_ok());
    }
}
