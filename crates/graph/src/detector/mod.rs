//! Relationship detection
//!
//! Infers directed edges between a node and the other nodes of the graph
//! from a minimal, per-type projection of its entity. Batches are scanned
//! in two passes so that nodes added together see each other.

pub mod rules;

use crate::entity::projection::{minimal_fields, REFERENCE_FIELDS};
use crate::entity::Entity;
use crate::events::{EventCategory, EventSink, GraphEvent, DETECTOR};
use crate::fetcher::EntityFetcher;
use crate::model::{DetectedRelationship, GraphEdge, GraphNode};
use crate::store::{GraphStore, NodeUpdate};
use citeforge_common::errors::{AppError, Result};
use citeforge_common::metrics::record_detection;
use citeforge_common::types::EntityType;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub use rules::extract_relationships;

pub struct RelationshipDetector {
    store: Arc<dyn GraphStore>,
    fetcher: Arc<EntityFetcher>,
    events: Arc<dyn EventSink>,
}

impl RelationshipDetector {
    pub fn new(store: Arc<dyn GraphStore>, fetcher: Arc<EntityFetcher>, events: Arc<dyn EventSink>) -> Self {
        Self { store, fetcher, events }
    }

    fn emit(&self, name: &str, payload: Value) {
        self.events
            .emit(GraphEvent::new(EventCategory::Detection, DETECTOR, name, payload));
    }

    /// Edges between `node_id` and every other node currently in the graph
    #[instrument(skip(self))]
    pub async fn detect_for_node(&self, node_id: &str) -> Result<Vec<GraphEdge>> {
        let candidates: HashSet<String> = self
            .store
            .node_ids()
            .into_iter()
            .filter(|id| id != node_id)
            .collect();

        let found = self.detect_against(node_id, &candidates).await?;
        record_detection("single", found.len());
        self.emit(
            "node_detected",
            json!({ "node_id": node_id, "relationships": found.len() }),
        );
        Ok(found.into_iter().map(DetectedRelationship::into_edge).collect())
    }

    /// Edges for a batch of nodes, including edges among the batch itself.
    ///
    /// Pass one compares each batch node with the nodes that existed before
    /// the batch, in both directions. Pass two compares each batch node with
    /// the other batch nodes. Per-node failures are logged and skipped.
    #[instrument(skip(self, node_ids), fields(batch = node_ids.len()))]
    pub async fn detect_for_nodes(&self, node_ids: &[String]) -> Vec<GraphEdge> {
        let mut batch: Vec<String> = Vec::new();
        for id in node_ids {
            if self.store.has_node(id) && !batch.contains(id) {
                batch.push(id.clone());
            }
        }
        if batch.is_empty() {
            return Vec::new();
        }

        let batch_set: HashSet<String> = batch.iter().cloned().collect();
        let existing: Vec<String> = self
            .store
            .node_ids()
            .into_iter()
            .filter(|id| !batch_set.contains(id))
            .collect();
        let existing_set: HashSet<String> = existing.iter().cloned().collect();

        self.emit(
            "batch_started",
            json!({ "batch": batch.len(), "existing": existing.len() }),
        );

        let mut merged = Merged::default();

        // Pass 1
        if !existing_set.is_empty() {
            for id in &batch {
                self.collect(id, &existing_set, &mut merged).await;
            }
            for id in &existing {
                self.collect(id, &batch_set, &mut merged).await;
            }
        }
        let first_pass = merged.len();
        record_detection("first", first_pass);

        // Pass 2
        if batch.len() > 1 {
            for id in &batch {
                let others: HashSet<String> = batch_set.iter().filter(|other| *other != id).cloned().collect();
                self.collect(id, &others, &mut merged).await;
            }
        }
        record_detection("second", merged.len() - first_pass);

        info!(
            batch = batch.len(),
            first_pass,
            second_pass = merged.len() - first_pass,
            failures = merged.failures,
            "Batch detection complete"
        );
        self.emit(
            "batch_completed",
            json!({
                "batch": batch.len(),
                "first_pass": first_pass,
                "second_pass": merged.len() - first_pass,
                "failures": merged.failures,
            }),
        );

        merged.into_edges()
    }

    async fn collect(&self, node_id: &str, candidates: &HashSet<String>, merged: &mut Merged) {
        match self.detect_against(node_id, candidates).await {
            Ok(found) => merged.extend(found),
            Err(e) => {
                merged.failures += 1;
                warn!(node_id = %node_id, error = %e, "Detection failed for node");
                self.emit(
                    "node_detection_failed",
                    json!({ "node_id": node_id, "error": e.to_string() }),
                );
            }
        }
    }

    /// Relationships between `node_id` and `candidates`.
    ///
    /// A malformed projection yields no relationships rather than an error.
    async fn detect_against(&self, node_id: &str, candidates: &HashSet<String>) -> Result<Vec<DetectedRelationship>> {
        let node = self
            .store
            .get_node(node_id)
            .ok_or_else(|| AppError::NodeNotFound { id: node_id.to_string() })?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let entity = match self.minimal_entity(&node).await {
            Ok(entity) => entity,
            Err(e) if e.is_malformed() => {
                debug!(node_id = %node_id, error = %e, "Malformed projection treated as absent");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut found = rules::extract_relationships(node_id, &entity, candidates);

        if rules::lacks_references(&entity) && candidates.iter().any(|id| id.starts_with('W')) {
            match retained_references(&node.entity_data) {
                Some(referenced) => {
                    found.extend(rules::reference_relationships(node_id, &referenced, candidates))
                }
                None => found.extend(self.reference_fallback(node_id, candidates).await),
            }
        }

        debug!(node_id = %node_id, relationships = found.len(), "Detected relationships");
        Ok(found)
    }

    /// Retained data when it satisfies the projection, else a projection fetch
    async fn minimal_entity(&self, node: &GraphNode) -> Result<Entity> {
        let fields = minimal_fields(node.entity_type);
        if let Some(entity) = Entity::from_retained(node.entity_type, &node.entity_data, fields) {
            return Ok(entity);
        }

        let projected = self
            .fetcher
            .fetch(node.entity_type, &node.id, Some(fields))
            .await?;
        self.retain(&node.id, projected.raw());
        Ok(projected.as_ref().clone())
    }

    /// One dedicated `(id, referenced_works)` fetch; failures only cost the
    /// reference edges
    async fn reference_fallback(&self, node_id: &str, candidates: &HashSet<String>) -> Vec<DetectedRelationship> {
        match self
            .fetcher
            .fetch(EntityType::Works, node_id, Some(REFERENCE_FIELDS))
            .await
        {
            Ok(entity) => {
                let referenced = rules::referenced_works(&entity).unwrap_or_default();
                self.retain(node_id, entity.raw());
                rules::reference_relationships(node_id, referenced, candidates)
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Reference list unavailable");
                Vec::new()
            }
        }
    }

    /// Merge fetched fields the node does not retain yet into its payload
    fn retain(&self, node_id: &str, fetched: &Value) {
        let (Some(node), Some(fetched)) = (self.store.get_node(node_id), fetched.as_object()) else {
            return;
        };
        let mut data = match node.entity_data {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let before = data.len();
        for (key, value) in fetched {
            data.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if data.len() != before {
            self.store.update_node(
                node_id,
                NodeUpdate {
                    entity_data: Some(Value::Object(data)),
                    ..NodeUpdate::default()
                },
            );
        }
    }
}

/// Reference list kept in a node's payload from an earlier fetch
fn retained_references(entity_data: &Value) -> Option<Vec<String>> {
    let referenced = entity_data.get("referenced_works")?.as_array()?;
    Some(
        referenced
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

/// Relationships from both passes, deduplicated by key
#[derive(Default)]
struct Merged {
    keys: HashSet<String>,
    relationships: Vec<DetectedRelationship>,
    failures: usize,
}

impl Merged {
    fn extend(&mut self, found: Vec<DetectedRelationship>) {
        for relationship in found {
            if self.keys.insert(relationship.key()) {
                self.relationships.push(relationship);
            }
        }
    }

    fn len(&self) -> usize {
        self.relationships.len()
    }

    fn into_edges(self) -> Vec<GraphEdge> {
        self.relationships
            .into_iter()
            .map(DetectedRelationship::into_edge)
            .collect()
    }
}
