//! Envelope wire format.
//!
//! The same JSON shape is read from clients, popped from the bus and
//! written back out to subscribers:
//!
//! ```json
//! {"client_id": "abc", "channel": "deck.42", "request": "update", "data": {}}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Request kind clients send as a heartbeat. Never registers anything.
pub const PING_REQUEST: &str = "ping";

/// The message unit exchanged with clients and the bus.
///
/// Missing fields decode to empty values and unknown fields are ignored.
/// An envelope is never modified after decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Opaque sender identifier.
    pub client_id: String,
    /// Routing key.
    pub channel: String,
    /// Request kind; `"ping"` is reserved.
    pub request: String,
    /// Application payload, passed through verbatim.
    #[serde(deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Decode an envelope from JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Decode an envelope from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Serialize for delivery.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Whether this is a heartbeat.
    pub fn is_ping(&self) -> bool {
        self.request == PING_REQUEST
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}
