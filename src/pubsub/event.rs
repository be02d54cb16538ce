//! # Change Events
//!
//! The event contract between the catalogs and live subscribers: channel
//! names and payload shapes for new-record notifications. The bus never
//! filters by entity id; a subscriber that cares about one stream or
//! platform filters the delivered payload itself.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Channel for packets inserted into any stream
pub const PACKET_INSERTED: &str = "packet inserted";

/// Channel for location records inserted for any platform
pub const LOCATION_INSERTED: &str = "location inserted";

/// Payload published on [`PACKET_INSERTED`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketInserted {
    #[serde(rename = "streamID")]
    pub stream_id: String,
    pub packet: Value,
}

impl PacketInserted {
    pub fn new(stream_id: impl Into<String>, packet: Value) -> Self {
        Self {
            stream_id: stream_id.into(),
            packet,
        }
    }

    /// Wire shape delivered to subscribers
    pub fn to_payload(&self) -> Value {
        json!({
            "streamID": self.stream_id,
            "packet": self.packet,
        })
    }
}

/// Payload published on [`LOCATION_INSERTED`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationInserted {
    #[serde(rename = "platformID")]
    pub platform_id: String,
    #[serde(rename = "locationRecord")]
    pub location_record: Value,
}

impl LocationInserted {
    pub fn new(platform_id: impl Into<String>, location_record: Value) -> Self {
        Self {
            platform_id: platform_id.into(),
            location_record,
        }
    }

    /// Wire shape delivered to subscribers
    pub fn to_payload(&self) -> Value {
        json!({
            "platformID": self.platform_id,
            "locationRecord": self.location_record,
        })
    }
}
