//! Graph store port
//!
//! The engine never owns node or edge collections itself; it talks to an
//! injected [`GraphStore`]. Store calls are synchronous and never suspend.

pub mod memory;

use crate::model::{ExternalId, GraphEdge, GraphNode, HydrationLevel};
use serde_json::Value;

pub use memory::InMemoryGraphStore;

/// Partial update applied to an existing node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub label: Option<String>,
    /// Ignored when lower than the current level
    pub hydration_level: Option<HydrationLevel>,
    /// Replaces the retained payload
    pub entity_data: Option<Value>,
    pub external_ids: Option<Vec<ExternalId>>,
    pub traversal_depth: Option<Option<u32>>,
}

impl NodeUpdate {
    /// Update carrying a freshly fetched node's content
    pub fn from_node(node: &GraphNode) -> Self {
        Self {
            label: Some(node.label.clone()),
            hydration_level: Some(node.hydration_level),
            entity_data: Some(node.entity_data.clone()),
            external_ids: Some(node.external_ids.clone()),
            traversal_depth: None,
        }
    }
}

/// Node and edge storage
pub trait GraphStore: Send + Sync {
    /// Insert nodes whose id is absent; returns the ids actually added
    fn add_nodes(&self, nodes: Vec<GraphNode>) -> Vec<String>;

    /// Insert edges whose id is absent and whose endpoints both exist;
    /// returns the number added
    fn add_edges(&self, edges: Vec<GraphEdge>) -> usize;

    fn get_node(&self, id: &str) -> Option<GraphNode>;

    fn has_node(&self, id: &str) -> bool;

    /// Node ids in insertion order
    fn node_ids(&self) -> Vec<String>;

    fn nodes(&self) -> Vec<GraphNode>;

    fn edges(&self) -> Vec<GraphEdge>;

    /// Apply `update` to a node; returns false when the node is absent
    fn update_node(&self, id: &str, update: NodeUpdate) -> bool;

    fn mark_node_as_loading(&self, id: &str);

    fn mark_node_as_loaded(&self, id: &str);

    fn mark_node_as_error(&self, id: &str, message: &str);

    fn mark_node_expanded(&self, id: &str);

    fn is_node_expanded(&self, id: &str) -> bool;

    /// Drop every node, edge and expansion mark
    fn clear(&self);
}
