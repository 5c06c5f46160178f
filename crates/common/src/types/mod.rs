//! Entity type vocabulary shared by the upstream client and the graph engine

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of entity kinds exposed by the metadata source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Works,
    Authors,
    Sources,
    Institutions,
    Topics,
    Publishers,
    Funders,
    Keywords,
    Concepts,
    Domains,
    Fields,
    Subfields,
}

impl EntityType {
    pub const ALL: [EntityType; 12] = [
        EntityType::Works,
        EntityType::Authors,
        EntityType::Sources,
        EntityType::Institutions,
        EntityType::Topics,
        EntityType::Publishers,
        EntityType::Funders,
        EntityType::Keywords,
        EntityType::Concepts,
        EntityType::Domains,
        EntityType::Fields,
        EntityType::Subfields,
    ];

    /// API path segment, e.g. `works`
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Works => "works",
            EntityType::Authors => "authors",
            EntityType::Sources => "sources",
            EntityType::Institutions => "institutions",
            EntityType::Topics => "topics",
            EntityType::Publishers => "publishers",
            EntityType::Funders => "funders",
            EntityType::Keywords => "keywords",
            EntityType::Concepts => "concepts",
            EntityType::Domains => "domains",
            EntityType::Fields => "fields",
            EntityType::Subfields => "subfields",
        }
    }

    /// Single-letter prefix used by short identifiers (`W123`, `A42`).
    /// Hierarchy levels and keywords use path-style ids instead.
    pub fn id_prefix(&self) -> Option<char> {
        match self {
            EntityType::Works => Some('W'),
            EntityType::Authors => Some('A'),
            EntityType::Sources => Some('S'),
            EntityType::Institutions => Some('I'),
            EntityType::Topics => Some('T'),
            EntityType::Publishers => Some('P'),
            EntityType::Funders => Some('F'),
            EntityType::Concepts => Some('C'),
            EntityType::Keywords
            | EntityType::Domains
            | EntityType::Fields
            | EntityType::Subfields => None,
        }
    }

    pub fn from_prefix(prefix: char) -> Option<Self> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.id_prefix() == Some(prefix.to_ascii_uppercase()))
    }

    /// Whether ids of this type are written `type/slug` rather than `X123`
    pub fn uses_path_ids(&self) -> bool {
        self.id_prefix().is_none()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let singular_ok = |t: &EntityType| {
            let plural = t.as_str();
            lowered == plural || lowered == plural.trim_end_matches('s')
        };
        EntityType::ALL
            .into_iter()
            .find(singular_ok)
            .ok_or_else(|| AppError::Validation {
                message: format!("unknown entity type '{}'", s),
                field: Some("entity_type".to_string()),
            })
    }
}
