use base64::Engine;
use serde::{Deserialize, Serialize};

/// One unit of data as delivered by the stream, before decoding.
///
/// `data` is opaque bytes — on the wire it is a base64 container around a
/// JSON payload, but the accumulator never assumes that; only the decoder
/// interprets it. `sequence` is assigned by the stream and is monotonic
/// within a partition.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub partition_key: String,
    pub sequence: String,
    pub data: Vec<u8>,
}

/// Transport envelope shared by producer and consumer.
///
/// Newline-delimited JSON on the stream connection. The payload travels
/// base64-encoded, mirroring how the records arrive at the consumer from
/// the stream API. The sequence token is not part of the envelope — the
/// stream side assigns it on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRecord {
    pub partition_key: String,
    /// Base64-encoded payload bytes.
    pub data: String,
}

impl WireRecord {
    pub fn from_payload(partition_key: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            partition_key: partition_key.into(),
            data: base64::engine::general_purpose::STANDARD.encode(payload),
        }
    }

    /// Attach a stream-assigned sequence token, producing the record shape
    /// the accumulator consumes.
    pub fn into_raw(self, sequence: String) -> RawRecord {
        RawRecord {
            partition_key: self.partition_key,
            sequence,
            data: self.data.into_bytes(),
        }
    }
}

/// A decoded record: a flat mapping of scalar fields plus provenance.
///
/// Invariant: every event originates from exactly one [`RawRecord`]; the
/// accumulator never synthesizes events. `partition_key` identifies the
/// source entity (the vehicle); `sequence` is kept for checkpointing.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub partition_key: String,
    pub sequence: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    /// The `timestamp` field every decoded payload is required to carry.
    pub fn timestamp(&self) -> Option<&str> {
        self.fields.get("timestamp").and_then(|v| v.as_str())
    }
}
