//! Domain event dispatched to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Source identifier stamped on events created by this service.
pub const DEFAULT_SOURCE: &str = "hookrelay";

/// Payload schema version stamped on new events.
pub const SCHEMA_VERSION: &str = "1.0";

/// An immutable domain occurrence. Serialized as-is into the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl Event {
    /// Create a new event with a fresh id and the current timestamp.
    pub fn new(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            source: default_source(),
            version: default_version(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_type_field() {
        let mut payload = Map::new();
        payload.insert("job_id".to_string(), json!("job-42"));
        let event = Event::new("job.completed", payload).with_id("evt_1");

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "job.completed");
        assert_eq!(value["id"], "evt_1");
        assert_eq!(value["payload"]["job_id"], "job-42");
        assert_eq!(value["source"], DEFAULT_SOURCE);
        assert_eq!(value["version"], SCHEMA_VERSION);
    }

    #[test]
    fn test_event_deserialization_minimal() {
        let json = r#"{"id": "evt_9", "type": "user.created", "timestamp": "2024-01-01T00:00:00Z"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, "evt_9");
        assert_eq!(event.event_type, "user.created");
        assert!(event.payload.is_empty());
        assert_eq!(event.source, DEFAULT_SOURCE);
    }

    #[test]
    fn test_new_events_get_distinct_ids() {
        let a = Event::new("x", Map::new());
        let b = Event::new("x", Map::new());
        assert_ne!(a.id, b.id);
    }
}
