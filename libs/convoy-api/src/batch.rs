use chrono::Utc;
use uuid::Uuid;

use crate::record::Event;

/// Globally unique identity of one flushed batch.
///
/// Composed of a coarse UTC timestamp (second granularity) and a random
/// suffix, so concurrent flushes and flushes across restarts cannot
/// collide in practice. The full object key is
/// `{prefix}{YYYY-MM-DDTHH-MM-SS}_{8 hex}.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchKey {
    timestamp: String,
    suffix: String,
    object_key: String,
}

impl BatchKey {
    pub fn generate(prefix: &str) -> Self {
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_string();
        let object_key = format!("{prefix}{timestamp}_{suffix}.json");
        Self {
            timestamp,
            suffix,
            object_key,
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }
}

/// An immutable ordered group of events flushed together as one durable
/// object. Created at flush time, written once, never mutated.
#[derive(Debug, Clone)]
pub struct Batch {
    key: BatchKey,
    events: Vec<Event>,
}

impl Batch {
    pub fn new(key: BatchKey, events: Vec<Event>) -> Self {
        Self { key, events }
    }

    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize the batch body: a JSON array of the events' field objects,
    /// in buffer order.
    pub fn body(&self) -> Result<Vec<u8>, serde_json::Error> {
        let fields: Vec<_> = self.events.iter().map(|e| &e.fields).collect();
        serde_json::to_vec(&fields)
    }
}
