//! # Query Options
//!
//! The option set recognized by the time-series store: inclusive
//! timestamp bounds, point lookups, sort field/direction, a result limit,
//! an aggregate operator, and exact-match field filters. Unrecognized
//! values are caller errors, not silent defaults.

use std::cmp::Ordering;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::codec::{KEY_FIELD, TIMESTAMP_FIELD};
use super::errors::{StoreError, StoreResult};

/// Sort direction for range reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn parse(text: &str) -> StoreResult<Self> {
        match text {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(StoreError::InvalidQuery(format!(
                "direction must be `asc` or `desc`, got `{other}`"
            ))),
        }
    }
}

/// Aggregate operator applied over one field of the matched records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateType {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggregateType {
    fn parse(text: &str) -> StoreResult<Self> {
        match text {
            "min" => Ok(AggregateType::Min),
            "max" => Ok(AggregateType::Max),
            "sum" => Ok(AggregateType::Sum),
            "avg" => Ok(AggregateType::Avg),
            "count" => Ok(AggregateType::Count),
            other => Err(StoreError::InvalidQuery(format!(
                "unknown aggregate type `{other}`"
            ))),
        }
    }
}

/// Caller-supplied query options.
///
/// `start`/`stop` are inclusive epoch-millisecond bounds defaulting to
/// the beginning of time and now; `timestamp` collapses the range to a
/// point lookup. Any field this struct does not name is collected into
/// `filters` and matched by exact equality.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryOptions {
    /// Inclusive lower timestamp bound
    pub start: Option<i64>,

    /// Inclusive upper timestamp bound
    pub stop: Option<i64>,

    /// Exact-timestamp point lookup
    pub timestamp: Option<i64>,

    /// Sort field; the key field when absent
    pub sort: Option<String>,

    /// `asc` or `desc`; anything else is an [`StoreError::InvalidQuery`]
    pub direction: Option<String>,

    /// Maximum number of records returned
    pub limit: Option<u64>,

    /// Aggregate operator, required by aggregate calls only
    #[serde(rename = "aggregateType")]
    pub aggregate_type: Option<String>,

    /// Exact-match filters on arbitrary record fields
    #[serde(flatten)]
    pub filters: Map<String, Value>,
}

impl QueryOptions {
    /// Options selecting `[start, stop]`
    pub fn between(start: i64, stop: i64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            ..Self::default()
        }
    }

    /// Options selecting exactly one timestamp
    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }

    /// Options carrying an aggregate operator
    pub fn aggregating(aggregate_type: &str) -> Self {
        Self {
            aggregate_type: Some(aggregate_type.to_string()),
            ..Self::default()
        }
    }

    /// Parse options out of a caller-supplied JSON object; malformed
    /// shapes (non-numeric limit, non-object input) are caller errors.
    pub fn from_value(value: Value) -> StoreResult<Self> {
        serde_json::from_value(value).map_err(|err| StoreError::InvalidQuery(err.to_string()))
    }

    pub(crate) fn parsed_direction(&self) -> StoreResult<SortDirection> {
        match &self.direction {
            Some(text) => SortDirection::parse(text),
            None => Ok(SortDirection::Asc),
        }
    }

    pub(crate) fn parsed_aggregate(&self) -> StoreResult<AggregateType> {
        match &self.aggregate_type {
            Some(text) => AggregateType::parse(text),
            None => Err(StoreError::InvalidQuery(
                "aggregateType is required".into(),
            )),
        }
    }

    pub(crate) fn parsed_limit(&self) -> Option<usize> {
        self.limit.map(|n| n as usize)
    }

    /// True when the requested sort resolves to the ordering key. Key
    /// aliases are translated so callers never see the internal name.
    pub(crate) fn sorts_by_key(&self) -> bool {
        match self.sort.as_deref() {
            None => true,
            Some(field) => field == TIMESTAMP_FIELD || field == KEY_FIELD || field == "_id",
        }
    }
}

/// Exact-equality record filter: every filter field must be present,
/// non-null and equal. No type coercion.
pub(crate) fn matches_filters(record: &Value, filters: &Map<String, Value>) -> bool {
    filters.iter().all(|(field, expected)| {
        record
            .get(field)
            .map(|actual| !actual.is_null() && actual == expected)
            .unwrap_or(false)
    })
}

/// Deterministic ordering over optional JSON values for non-key sorts:
/// absent < null < bool < number < string < array < object, natural
/// ordering within a type.
pub(crate) fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let rank = |v: &Value| -> u8 {
                match v {
                    Value::Null => 0,
                    Value::Bool(_) => 1,
                    Value::Number(_) => 2,
                    Value::String(_) => 3,
                    Value::Array(_) => 4,
                    Value::Object(_) => 5,
                }
            };
            if rank(a) != rank(b) {
                return rank(a).cmp(&rank(b));
            }
            match (a, b) {
                (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
                (Value::Number(a), Value::Number(b)) => {
                    let a = a.as_f64().unwrap_or(0.0);
                    let b = b.as_f64().unwrap_or(0.0);
                    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
                }
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => Ordering::Equal,
            }
        }
    }
}
