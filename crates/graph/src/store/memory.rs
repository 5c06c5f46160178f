//! In-memory graph store

use super::{GraphStore, NodeUpdate};
use crate::model::{GraphEdge, GraphNode, NodeStatus};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, GraphNode>,
    node_order: Vec<String>,
    edges: HashMap<String, GraphEdge>,
    edge_order: Vec<String>,
    expanded: HashSet<String>,
}

/// Reference [`GraphStore`] adapter backed by hash maps
#[derive(Default)]
pub struct InMemoryGraphStore {
    inner: RwLock<Inner>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, id: &str, status: NodeStatus) {
        if let Some(node) = self.write().nodes.get_mut(id) {
            node.status = status;
        }
    }

    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.read().edges.len()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn add_nodes(&self, nodes: Vec<GraphNode>) -> Vec<String> {
        let mut inner = self.write();
        let mut added = Vec::new();
        for node in nodes {
            if inner.nodes.contains_key(&node.id) {
                continue;
            }
            inner.node_order.push(node.id.clone());
            added.push(node.id.clone());
            inner.nodes.insert(node.id.clone(), node);
        }
        added
    }

    fn add_edges(&self, edges: Vec<GraphEdge>) -> usize {
        let mut inner = self.write();
        let mut added = 0;
        for edge in edges {
            if inner.edges.contains_key(&edge.id) {
                continue;
            }
            if !inner.nodes.contains_key(&edge.source) || !inner.nodes.contains_key(&edge.target) {
                tracing::debug!(edge = %edge.id, "Dropping edge with missing endpoint");
                continue;
            }
            inner.edge_order.push(edge.id.clone());
            inner.edges.insert(edge.id.clone(), edge);
            added += 1;
        }
        added
    }

    fn get_node(&self, id: &str) -> Option<GraphNode> {
        self.read().nodes.get(id).cloned()
    }

    fn has_node(&self, id: &str) -> bool {
        self.read().nodes.contains_key(id)
    }

    fn node_ids(&self) -> Vec<String> {
        self.read().node_order.clone()
    }

    fn nodes(&self) -> Vec<GraphNode> {
        let inner = self.read();
        inner
            .node_order
            .iter()
            .filter_map(|id| inner.nodes.get(id).cloned())
            .collect()
    }

    fn edges(&self) -> Vec<GraphEdge> {
        let inner = self.read();
        inner
            .edge_order
            .iter()
            .filter_map(|id| inner.edges.get(id).cloned())
            .collect()
    }

    fn update_node(&self, id: &str, update: NodeUpdate) -> bool {
        let mut inner = self.write();
        let Some(node) = inner.nodes.get_mut(id) else {
            return false;
        };
        if let Some(label) = update.label {
            node.label = label;
        }
        if let Some(level) = update.hydration_level {
            node.hydration_level = node.hydration_level.max(level);
        }
        if let Some(data) = update.entity_data {
            node.entity_data = data;
        }
        if let Some(external_ids) = update.external_ids {
            node.external_ids = external_ids;
        }
        if let Some(depth) = update.traversal_depth {
            node.traversal_depth = depth;
        }
        true
    }

    fn mark_node_as_loading(&self, id: &str) {
        self.set_status(id, NodeStatus::Loading);
    }

    fn mark_node_as_loaded(&self, id: &str) {
        self.set_status(id, NodeStatus::Ready);
    }

    fn mark_node_as_error(&self, id: &str, message: &str) {
        self.set_status(
            id,
            NodeStatus::Error {
                message: message.to_string(),
            },
        );
    }

    fn mark_node_expanded(&self, id: &str) {
        self.write().expanded.insert(id.to_string());
    }

    fn is_node_expanded(&self, id: &str) -> bool {
        self.read().expanded.contains(id)
    }

    fn clear(&self) {
        *self.write() = Inner::default();
    }
}
