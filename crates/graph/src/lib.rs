//! CiteForge Graph Engine
//!
//! Incrementally builds a citation/affiliation graph from an
//! OpenAlex-compatible API:
//! - Entity model validated at the fetch boundary
//! - Single-flight fetch deduplication with a freshness cache
//! - Two-pass relationship detection
//! - Graph materialization (load, expand, hydrate)
//! - Store port with an in-memory adapter

pub mod dedup;
pub mod detector;
pub mod entity;
pub mod events;
pub mod fetcher;
pub mod materializer;
pub mod model;
pub mod store;

pub use dedup::{DedupConfig, DedupStats, FetchDeduplicator};
pub use detector::RelationshipDetector;
pub use entity::{Entity, EntityKind};
pub use events::{EventSink, GraphEvent, RecordingEventSink, TracingEventSink};
pub use fetcher::EntityFetcher;
pub use materializer::{
    ExpandOptions, ExpandOutcome, GraphMaterializer, GraphSnapshot, GraphStats, LoadOutcome, SweepReport,
};
pub use model::{GraphEdge, GraphNode, HydrationLevel, NodeStatus, RelationType};
pub use store::{GraphStore, InMemoryGraphStore, NodeUpdate};
