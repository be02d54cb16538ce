//! Store-level invariants: key uniqueness, ordering, bounded retention,
//! the field-mapping contract and aggregate semantics.

use std::sync::Arc;

use serde_json::json;

use pulsedb::registry::{CollectionOptions, CollectionRegistry};
use pulsedb::timeseries::{QueryOptions, StoreError, TimeSeriesStore};

fn store_with(options: CollectionOptions) -> TimeSeriesStore {
    TimeSeriesStore::new(Arc::new(CollectionRegistry::new()), "packets_", options)
}

#[test]
fn distinct_timestamps_both_stored_ascending_by_default() {
    let store = store_with(CollectionOptions::unbounded());
    store.insert("s", json!({"timestamp": 2000, "x": "b"})).unwrap();
    store.insert("s", json!({"timestamp": 1000, "x": "a"})).unwrap();

    let records = store.find("s", &QueryOptions::default()).unwrap();
    assert_eq!(
        records,
        vec![
            json!({"timestamp": 1000, "x": "a"}),
            json!({"timestamp": 2000, "x": "b"}),
        ]
    );
}

#[test]
fn duplicate_timestamp_first_wins() {
    let store = store_with(CollectionOptions::unbounded());
    store.insert("s", json!({"timestamp": 1000, "x": 1})).unwrap();

    let err = store.insert("s", json!({"timestamp": 1000, "x": 2})).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey(1000)));

    let records = store.find("s", &QueryOptions::at(1000)).unwrap();
    assert_eq!(records, vec![json!({"timestamp": 1000, "x": 1})]);
}

#[test]
fn round_trip_hides_internal_key() {
    let store = store_with(CollectionOptions::unbounded());
    store.insert("s", json!({"timestamp": 1000, "x": 1})).unwrap();

    let record = store.find_one("s", &QueryOptions::at(1000)).unwrap().unwrap();
    assert_eq!(record, json!({"timestamp": 1000, "x": 1}));
    assert!(record.get("_ts").is_none());
    assert!(record.get("_id").is_none());
}

#[test]
fn record_carrying_internal_key_is_rejected() {
    let store = store_with(CollectionOptions::unbounded());
    let err = store
        .insert("s", json!({"timestamp": 1, "_ts": "1970-01-01T00:00:00Z"}))
        .unwrap_err();
    assert!(matches!(err, StoreError::ReservedKeyField(_)));
}

#[test]
fn record_without_timestamp_is_rejected() {
    let store = store_with(CollectionOptions::unbounded());
    let err = store.insert("s", json!({"x": 1})).unwrap_err();
    assert!(matches!(err, StoreError::MissingTimestamp));
}

#[test]
fn cap_keeps_only_most_recent_records() {
    let cap = 4usize;
    let extra = 3usize;
    let store = store_with(CollectionOptions::capped(cap));

    for millis in 1..=(cap + extra) as i64 {
        store.insert("s", json!({"timestamp": millis})).unwrap();
    }

    let records = store.find("s", &QueryOptions::default()).unwrap();
    let stamps: Vec<i64> = records
        .iter()
        .map(|r| r["timestamp"].as_i64().unwrap())
        .collect();
    assert_eq!(stamps, vec![4, 5, 6, 7]);

    // Evicted timestamps are silently absent, not errors
    assert_eq!(store.find_one("s", &QueryOptions::at(1)).unwrap(), None);
}

#[test]
fn aggregate_max_over_window_ignores_null_and_out_of_range() {
    let store = store_with(CollectionOptions::unbounded());
    store.insert("s", json!({"timestamp": 10, "temp": 5})).unwrap();
    store.insert("s", json!({"timestamp": 20, "temp": 9})).unwrap();
    store.insert("s", json!({"timestamp": 30, "temp": null})).unwrap();
    store.insert("s", json!({"timestamp": 999, "temp": 100})).unwrap();

    let mut options = QueryOptions::aggregating("max");
    options.start = Some(0);
    options.stop = Some(50);
    assert_eq!(store.aggregate("s", "temp", &options).unwrap(), Some(json!(9)));

    options.start = Some(40);
    assert_eq!(store.aggregate("s", "temp", &options).unwrap(), None);
}

#[test]
fn inverted_window_matches_nothing() {
    let store = store_with(CollectionOptions::unbounded());
    store.insert("s", json!({"timestamp": 1500, "temp": 7})).unwrap();

    // start after stop
    assert!(store.find("s", &QueryOptions::between(2000, 1000)).unwrap().is_empty());
    assert_eq!(
        store.find_one("s", &QueryOptions::between(2000, 1000)).unwrap(),
        None
    );

    // start in the future, stop defaulting to now
    let future = QueryOptions {
        start: Some(4_000_000_000_000),
        ..QueryOptions::default()
    };
    assert!(store.find("s", &future).unwrap().is_empty());

    let mut options = QueryOptions::aggregating("min");
    options.start = Some(2000);
    options.stop = Some(1000);
    assert_eq!(store.aggregate("s", "temp", &options).unwrap(), None);

    let mut count = QueryOptions::aggregating("count");
    count.start = Some(2000);
    count.stop = Some(1000);
    assert_eq!(store.aggregate("s", "temp", &count).unwrap(), Some(json!(0)));
}

#[test]
fn invalid_direction_and_missing_aggregate_type_are_caller_errors() {
    let store = store_with(CollectionOptions::unbounded());

    let options = QueryOptions {
        direction: Some("upwards".into()),
        ..QueryOptions::default()
    };
    assert!(matches!(
        store.find("s", &options),
        Err(StoreError::InvalidQuery(_))
    ));

    assert!(matches!(
        store.aggregate("s", "temp", &QueryOptions::default()),
        Err(StoreError::InvalidQuery(_))
    ));
}

#[test]
fn concurrent_same_timestamp_inserts_exactly_one_wins() {
    let store = Arc::new(store_with(CollectionOptions::unbounded()));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store.insert("s", json!({"timestamp": 1000, "worker": worker}))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(StoreError::DuplicateKey(1000))));
    }

    assert_eq!(store.find("s", &QueryOptions::at(1000)).unwrap().len(), 1);
}
