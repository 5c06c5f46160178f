//! Structured observability events
//!
//! Components report major steps as [`GraphEvent`]s to an injected
//! [`EventSink`]. The default sink forwards them to `tracing`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

pub const DEDUPLICATOR: &str = "FetchDeduplicator";
pub const DETECTOR: &str = "RelationshipDetector";
pub const MATERIALIZER: &str = "GraphMaterializer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Fetch,
    Detection,
    Expansion,
    Hydration,
    Load,
    Store,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Fetch => "fetch",
            EventCategory::Detection => "detection",
            EventCategory::Expansion => "expansion",
            EventCategory::Hydration => "hydration",
            EventCategory::Load => "load",
            EventCategory::Store => "store",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEvent {
    pub category: EventCategory,
    pub component: &'static str,
    pub name: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl GraphEvent {
    pub fn new(category: EventCategory, component: &'static str, name: &str, payload: Value) -> Self {
        Self {
            category,
            component,
            name: name.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of graph events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GraphEvent);
}

/// Forwards events to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: GraphEvent) {
        tracing::debug!(
            category = event.category.as_str(),
            component = event.component,
            event = %event.name,
            payload = %event.payload,
            "Graph event"
        );
    }
}

/// Keeps every event in memory, for assertions
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<GraphEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GraphEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the recorded events, in emission order
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.events().iter().any(|e| e.name == name)
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: GraphEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.emit(GraphEvent::new(EventCategory::Load, MATERIALIZER, "load_started", json!({"id": "W1"})));
        sink.emit(GraphEvent::new(EventCategory::Load, MATERIALIZER, "load_completed", json!({})));

        assert_eq!(sink.names(), vec!["load_started", "load_completed"]);
        assert!(sink.contains("load_completed"));
        assert_eq!(sink.events()[0].component, "GraphMaterializer");
    }
}
