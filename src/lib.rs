//! pulsedb - bounded time-series telemetry store with live change
//! notification
//!
//! Ingests timestamp-keyed telemetry records into per-entity bounded
//! collections, answers range/point/aggregate queries over them, and
//! fans out change events to in-process subscribers as records arrive.

pub mod catalog;
pub mod pubsub;
pub mod registry;
pub mod timeseries;
