//! Graph data model
//!
//! Nodes, edges and the relationship vocabulary shared by the detector,
//! the materializer and the store.

use crate::entity::identifiers::external_ids;
use crate::entity::Entity;
use citeforge_common::types::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How much of an entity a node carries
///
/// Ordered: a node only ever moves from `Minimal` to `Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationLevel {
    Minimal,
    Full,
}

/// Transient node status, orthogonal to the hydration level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Ready,
    Loading,
    Error { message: String },
}

/// Observable hydration state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationState {
    Minimal,
    Loading,
    Full,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalIdType {
    Doi,
    Orcid,
    Ror,
    Issn,
    Mag,
    Pmid,
    Pmcid,
    Wikidata,
    Wikipedia,
}

impl ExternalIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalIdType::Doi => "doi",
            ExternalIdType::Orcid => "orcid",
            ExternalIdType::Ror => "ror",
            ExternalIdType::Issn => "issn",
            ExternalIdType::Mag => "mag",
            ExternalIdType::Pmid => "pmid",
            ExternalIdType::Pmcid => "pmcid",
            ExternalIdType::Wikidata => "wikidata",
            ExternalIdType::Wikipedia => "wikipedia",
        }
    }
}

/// Identifier of the entity in another registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalId {
    pub id_type: ExternalIdType,
    pub value: String,
    pub url: Option<String>,
}

impl ExternalId {
    /// Build from a value that may already be a URL
    pub fn new(id_type: ExternalIdType, value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            let bare = value.rsplit('/').next().unwrap_or(value);
            let bare = match id_type {
                // DOIs contain slashes, keep everything after the resolver host
                ExternalIdType::Doi => value
                    .split_once("doi.org/")
                    .map(|(_, doi)| doi)
                    .unwrap_or(bare),
                _ => bare,
            };
            return Self {
                id_type,
                value: bare.to_string(),
                url: Some(value.to_string()),
            };
        }

        let url = match id_type {
            ExternalIdType::Doi => Some(format!("https://doi.org/{}", value)),
            ExternalIdType::Orcid => Some(format!("https://orcid.org/{}", value)),
            ExternalIdType::Ror => Some(format!("https://ror.org/{}", value)),
            ExternalIdType::Pmid => Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}", value)),
            ExternalIdType::Wikidata => Some(format!("https://www.wikidata.org/wiki/{}", value)),
            _ => None,
        };
        Self {
            id_type,
            value: value.to_string(),
            url,
        }
    }
}

/// Opaque layout coordinates, never read by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Node in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Normalized key (`W123`, `domains/1`)
    pub id: String,

    /// Canonical URI as returned upstream
    pub entity_id: String,

    pub entity_type: EntityType,

    pub label: String,

    pub hydration_level: HydrationLevel,

    #[serde(default)]
    pub status: NodeStatus,

    #[serde(default)]
    pub external_ids: Vec<ExternalId>,

    /// Retained payload, partial for minimal nodes
    #[serde(default)]
    pub entity_data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Hops from the primary node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traversal_depth: Option<u32>,
}

impl GraphNode {
    pub fn from_entity(entity: &Entity, hydration_level: HydrationLevel) -> Self {
        Self {
            id: entity.node_id(),
            entity_id: entity.id().to_string(),
            entity_type: entity.entity_type(),
            label: entity.label(),
            hydration_level,
            status: NodeStatus::Ready,
            external_ids: external_ids(entity.raw()),
            entity_data: entity.raw().clone(),
            position: None,
            traversal_depth: None,
        }
    }

    pub fn hydration_state(&self) -> HydrationState {
        match (&self.status, self.hydration_level) {
            (NodeStatus::Loading, _) => HydrationState::Loading,
            (NodeStatus::Error { .. }, _) => HydrationState::Error,
            (NodeStatus::Ready, HydrationLevel::Minimal) => HydrationState::Minimal,
            (NodeStatus::Ready, HydrationLevel::Full) => HydrationState::Full,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, NodeStatus::Error { .. })
    }
}

/// Kind of a directed edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// author -> work
    Authorship,
    /// work -> source
    Publication,
    /// work -> work it cites
    Reference,
    /// author -> institution
    Affiliation,
    /// source -> publisher or institution
    HostOrganization,
    /// child -> parent in an organisational or topical hierarchy
    Lineage,
    /// work -> funder
    FundedBy,
    HasTopic,
    HasKeyword,
    HasConcept,
    Related,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Authorship => "AUTHORSHIP",
            RelationType::Publication => "PUBLICATION",
            RelationType::Reference => "REFERENCE",
            RelationType::Affiliation => "AFFILIATION",
            RelationType::HostOrganization => "HOST_ORGANIZATION",
            RelationType::Lineage => "LINEAGE",
            RelationType::FundedBy => "FUNDED_BY",
            RelationType::HasTopic => "HAS_TOPIC",
            RelationType::HasKeyword => "HAS_KEYWORD",
            RelationType::HasConcept => "HAS_CONCEPT",
            RelationType::Related => "RELATED",
        }
    }

    /// Default human label
    pub fn label(&self) -> &'static str {
        match self {
            RelationType::Authorship => "authored",
            RelationType::Publication => "published in",
            RelationType::Reference => "cites",
            RelationType::Affiliation => "affiliated with",
            RelationType::HostOrganization => "hosted by",
            RelationType::Lineage => "part of",
            RelationType::FundedBy => "funded by",
            RelationType::HasTopic => "has topic",
            RelationType::HasKeyword => "has keyword",
            RelationType::HasConcept => "has concept",
            RelationType::Related => "related to",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which end of the relationship the analysed node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationDirection {
    /// The analysed node is the source
    Outbound,
    /// The analysed node is the target
    Inbound,
}

/// Relationship found by the detector, before it becomes an edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedRelationship {
    pub source_node_id: String,
    pub target_node_id: String,
    pub relation_type: RelationType,
    pub direction: RelationDirection,
    pub label: String,
    pub weight: Option<f64>,
    pub metadata: Option<Value>,
}

impl DetectedRelationship {
    pub fn key(&self) -> String {
        edge_id(&self.source_node_id, self.relation_type, &self.target_node_id)
    }

    pub fn into_edge(self) -> GraphEdge {
        let mut edge = GraphEdge::new(&self.source_node_id, &self.target_node_id, self.relation_type)
            .with_weight(self.weight)
            .with_metadata(self.metadata);
        edge.label = self.label;
        edge
    }
}

/// Deterministic edge id
pub fn edge_id(source: &str, relation_type: RelationType, target: &str) -> String {
    format!("{}-{}-{}", source, relation_type.as_str(), target)
}

/// Directed edge in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relation_type: RelationType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl GraphEdge {
    pub fn new(source: &str, target: &str, relation_type: RelationType) -> Self {
        Self {
            id: edge_id(source, relation_type, target),
            source: source.to_string(),
            target: target.to_string(),
            relation_type,
            label: relation_type.label().to_string(),
            weight: None,
            metadata: None,
        }
    }

    pub fn with_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
