//! Entity to graph fragment mapping

use crate::detector::rules::extract_relationships;
use crate::entity::Entity;
use crate::model::{DetectedRelationship, GraphEdge, GraphNode, HydrationLevel};
use serde::Serialize;
use std::collections::HashSet;

/// Nodes and edges derived from one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphFragment {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Map an entity to its node plus edges to referents in `present`.
///
/// Referenced entities that are not present never become nodes here.
pub fn transform_entity_to_graph(
    entity: &Entity,
    hydration_level: HydrationLevel,
    present: &HashSet<String>,
) -> GraphFragment {
    let node = GraphNode::from_entity(entity, hydration_level);
    let edges = extract_relationships(&node.id, entity, present)
        .into_iter()
        .map(DetectedRelationship::into_edge)
        .collect();
    GraphFragment {
        nodes: vec![node],
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeforge_common::types::EntityType;
    use serde_json::json;

    #[test]
    fn test_edges_only_to_present_referents() {
        let entity = Entity::from_value(
            EntityType::Works,
            json!({
                "id": "https://openalex.org/W1",
                "display_name": "Paper",
                "authorships": [
                    {"author": {"id": "https://openalex.org/A1"}},
                    {"author": {"id": "https://openalex.org/A2"}}
                ],
                "referenced_works": ["https://openalex.org/W2"]
            }),
        )
        .unwrap();

        let present: HashSet<String> = ["A2".to_string()].into_iter().collect();
        let fragment = transform_entity_to_graph(&entity, HydrationLevel::Minimal, &present);

        assert_eq!(fragment.nodes.len(), 1);
        assert_eq!(fragment.nodes[0].hydration_level, HydrationLevel::Minimal);
        assert_eq!(fragment.edges.len(), 1);
        assert_eq!(fragment.edges[0].id, "A2-AUTHORSHIP-W1");

        let empty = transform_entity_to_graph(&entity, HydrationLevel::Full, &HashSet::new());
        assert!(empty.edges.is_empty());
    }
}
