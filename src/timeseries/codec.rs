//! # Timestamp Key Codec
//!
//! The one bidirectional mapping between the external record shape
//! (`{"timestamp": <epoch-ms>, ...fields}`) and the stored shape, where
//! the timestamp is replaced by the internal ordering key. Every store
//! operation goes through this codec, so the insert and read paths cannot
//! drift apart. No field other than the timestamp/key pair is ever
//! renamed or converted.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};

/// External timestamp field name (epoch milliseconds)
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Internal ordering-key field name (RFC 3339 instant)
pub const KEY_FIELD: &str = "_ts";

/// Internal ordering key for one record: an instant with millisecond
/// precision, ordered exactly like the epoch-millisecond value it came
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey(DateTime<Utc>);

impl SeriesKey {
    /// Convert an epoch-millisecond value into a key.
    pub fn from_millis(millis: i64) -> StoreResult<Self> {
        match Utc.timestamp_millis_opt(millis) {
            chrono::LocalResult::Single(instant) => Ok(SeriesKey(instant)),
            _ => Err(StoreError::InvalidTimestamp(format!(
                "{millis} is outside the representable range"
            ))),
        }
    }

    /// The key for the current instant.
    pub fn now() -> Self {
        SeriesKey(Utc::now())
    }

    /// The smallest representable key.
    pub fn min() -> Self {
        SeriesKey(DateTime::<Utc>::MIN_UTC)
    }

    /// Back to epoch milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    fn to_rfc3339(self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn parse_rfc3339(text: &str) -> StoreResult<Self> {
        DateTime::parse_from_rfc3339(text)
            .map(|instant| SeriesKey(instant.with_timezone(&Utc)))
            .map_err(|err| StoreError::InvalidRecord(format!("bad internal key: {err}")))
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

/// Bidirectional timestamp-to-key record codec.
pub struct KeyCodec;

impl KeyCodec {
    /// External to stored form.
    ///
    /// The record must be an object carrying an integer `timestamp`; a
    /// record that already carries the internal key field is a caller
    /// error, never silently accepted.
    pub fn encode(record: Value) -> StoreResult<(SeriesKey, Value)> {
        let mut fields = into_object(record)?;

        if fields.contains_key(KEY_FIELD) {
            return Err(StoreError::ReservedKeyField(KEY_FIELD));
        }

        let timestamp = fields
            .remove(TIMESTAMP_FIELD)
            .ok_or(StoreError::MissingTimestamp)?;
        let millis = timestamp
            .as_i64()
            .ok_or_else(|| StoreError::InvalidTimestamp(timestamp.to_string()))?;

        let key = SeriesKey::from_millis(millis)?;
        fields.insert(KEY_FIELD.to_string(), Value::String(key.to_rfc3339()));
        Ok((key, Value::Object(fields)))
    }

    /// Stored to external form; exact inverse of [`KeyCodec::encode`].
    pub fn decode(stored: Value) -> StoreResult<Value> {
        let mut fields = into_object(stored)?;

        let key = fields
            .remove(KEY_FIELD)
            .ok_or_else(|| StoreError::InvalidRecord("stored record has no internal key".into()))?;
        let key = key
            .as_str()
            .map(SeriesKey::parse_rfc3339)
            .transpose()?
            .ok_or_else(|| StoreError::InvalidRecord("internal key is not a string".into()))?;

        fields.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::Number(key.as_millis().into()),
        );
        Ok(Value::Object(fields))
    }
}

fn into_object(value: Value) -> StoreResult<Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::InvalidRecord(format!(
            "expected an object, got {other}"
        ))),
    }
}
