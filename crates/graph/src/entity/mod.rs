//! Entity model
//!
//! Upstream payloads are validated once, at the fetch boundary, into a
//! closed set of per-kind variants. Downstream code pattern-matches on
//! [`EntityKind`] instead of probing JSON for field presence.

pub mod identifiers;
pub mod projection;

use citeforge_common::errors::{AppError, Result};
use citeforge_common::types::EntityType;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use identifiers::{entity_type_of, normalize_id, resolve, ResolvedIdentifier};

/// Upstream arrays are sometimes `null` instead of absent
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Dehydrated reference to another entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// A link that is either a bare id or a dehydrated object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
    Id(String),
    Ref(EntityRef),
}

impl Link {
    pub fn id(&self) -> Option<&str> {
        match self {
            Link::Id(id) => Some(id),
            Link::Ref(r) => r.id.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authorship {
    #[serde(default)]
    pub author: Option<EntityRef>,
    #[serde(default)]
    pub author_position: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub institutions: Vec<EntityRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub source: Option<EntityRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    #[serde(default)]
    pub funder: Option<String>,
    #[serde(default)]
    pub funder_display_name: Option<String>,
    #[serde(default)]
    pub award_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Affiliation {
    #[serde(default)]
    pub institution: Option<EntityRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub years: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub authorships: Vec<Authorship>,
    #[serde(default)]
    pub primary_location: Option<Location>,
    /// `None` when the field was not part of the payload
    #[serde(default)]
    pub referenced_works: Option<Vec<String>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub grants: Vec<Grant>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub keywords: Vec<EntityRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub concepts: Vec<EntityRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub affiliations: Vec<Affiliation>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_known_institutions: Vec<EntityRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub host_organization: Option<Link>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub lineage: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub lineage: Vec<String>,
    #[serde(default)]
    pub parent_publisher: Option<Link>,
}

/// Kinds with no relationship-bearing fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ancestors: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub subfield: Option<EntityRef>,
    #[serde(default)]
    pub field: Option<EntityRef>,
    #[serde(default)]
    pub domain: Option<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subfield {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub field: Option<EntityRef>,
    #[serde(default)]
    pub domain: Option<EntityRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub domain: Option<EntityRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subfields: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Vec<EntityRef>,
}

/// Validated entity variant
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Work(Work),
    Author(Author),
    Source(Source),
    Institution(Institution),
    Topic(Topic),
    Publisher(Publisher),
    Funder(Named),
    Keyword(Named),
    Concept(Concept),
    Domain(Domain),
    Field(Field),
    Subfield(Subfield),
}

macro_rules! each_kind {
    ($kind:expr, $e:ident => $body:expr) => {
        match $kind {
            EntityKind::Work($e) => $body,
            EntityKind::Author($e) => $body,
            EntityKind::Source($e) => $body,
            EntityKind::Institution($e) => $body,
            EntityKind::Topic($e) => $body,
            EntityKind::Publisher($e) => $body,
            EntityKind::Funder($e) => $body,
            EntityKind::Keyword($e) => $body,
            EntityKind::Concept($e) => $body,
            EntityKind::Domain($e) => $body,
            EntityKind::Field($e) => $body,
            EntityKind::Subfield($e) => $body,
        }
    };
}

/// A fetched entity: its validated variant plus the raw payload it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    kind: EntityKind,
    raw: Value,
}

impl Entity {
    /// Validate a raw payload as an entity of `expected` type
    pub fn from_value(expected: EntityType, raw: Value) -> Result<Self> {
        let malformed = |message: String| AppError::MalformedEntity {
            entity_type: expected.to_string(),
            message,
        };

        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing string id".to_string()))?;

        match entity_type_of(&normalize_id(id)) {
            Some(actual) if actual == expected => {}
            Some(actual) => return Err(malformed(format!("id {} belongs to {}", id, actual))),
            None => return Err(malformed(format!("unrecognised id {}", id))),
        }

        fn parse<T: serde::de::DeserializeOwned>(raw: &Value) -> std::result::Result<T, serde_json::Error> {
            T::deserialize(raw)
        }

        let kind = match expected {
            EntityType::Works => parse(&raw).map(EntityKind::Work),
            EntityType::Authors => parse(&raw).map(EntityKind::Author),
            EntityType::Sources => parse(&raw).map(EntityKind::Source),
            EntityType::Institutions => parse(&raw).map(EntityKind::Institution),
            EntityType::Topics => parse(&raw).map(EntityKind::Topic),
            EntityType::Publishers => parse(&raw).map(EntityKind::Publisher),
            EntityType::Funders => parse(&raw).map(EntityKind::Funder),
            EntityType::Keywords => parse(&raw).map(EntityKind::Keyword),
            EntityType::Concepts => parse(&raw).map(EntityKind::Concept),
            EntityType::Domains => parse(&raw).map(EntityKind::Domain),
            EntityType::Fields => parse(&raw).map(EntityKind::Field),
            EntityType::Subfields => parse(&raw).map(EntityKind::Subfield),
        }
        .map_err(|e| malformed(e.to_string()))?;

        Ok(Self { kind, raw })
    }

    /// Reuse a retained payload when it carries every field in `fields`
    pub fn from_retained(expected: EntityType, retained: &Value, fields: &[&str]) -> Option<Self> {
        let object = retained.as_object()?;
        if !fields.iter().all(|f| object.contains_key(*f)) {
            return None;
        }
        Self::from_value(expected, retained.clone()).ok()
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    pub fn entity_type(&self) -> EntityType {
        match &self.kind {
            EntityKind::Work(_) => EntityType::Works,
            EntityKind::Author(_) => EntityType::Authors,
            EntityKind::Source(_) => EntityType::Sources,
            EntityKind::Institution(_) => EntityType::Institutions,
            EntityKind::Topic(_) => EntityType::Topics,
            EntityKind::Publisher(_) => EntityType::Publishers,
            EntityKind::Funder(_) => EntityType::Funders,
            EntityKind::Keyword(_) => EntityType::Keywords,
            EntityKind::Concept(_) => EntityType::Concepts,
            EntityKind::Domain(_) => EntityType::Domains,
            EntityKind::Field(_) => EntityType::Fields,
            EntityKind::Subfield(_) => EntityType::Subfields,
        }
    }

    /// Canonical id as returned upstream (usually a URI)
    pub fn id(&self) -> &str {
        each_kind!(&self.kind, e => e.id.as_str())
    }

    /// Graph key derived from the canonical id
    pub fn node_id(&self) -> String {
        normalize_id(self.id())
    }

    pub fn display_name(&self) -> Option<&str> {
        each_kind!(&self.kind, e => e.display_name.as_deref())
    }

    /// Human label: display name, then work title, then the graph key
    pub fn label(&self) -> String {
        let title = match &self.kind {
            EntityKind::Work(w) => w.title.as_deref(),
            _ => None,
        };
        self.display_name()
            .or(title)
            .map(str::to_string)
            .unwrap_or_else(|| self.node_id())
    }

    /// Whether the raw payload carries every field in `fields`
    pub fn has_fields(&self, fields: &[&str]) -> bool {
        self.raw
            .as_object()
            .map(|o| fields.iter().all(|f| o.contains_key(*f)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_work_variant_parses() {
        let raw = json!({
            "id": "https://openalex.org/W1",
            "display_name": "Attention",
            "authorships": [{"author": {"id": "https://openalex.org/A1"}, "author_position": "first"}],
            "primary_location": {"source": {"id": "https://openalex.org/S1"}},
            "grants": null,
            "topics": [{"id": "https://openalex.org/T1", "score": 0.9}]
        });
        let entity = Entity::from_value(EntityType::Works, raw).unwrap();
        assert_eq!(entity.entity_type(), EntityType::Works);
        assert_eq!(entity.node_id(), "W1");
        assert_eq!(entity.label(), "Attention");
        match entity.kind() {
            EntityKind::Work(w) => {
                assert_eq!(w.authorships.len(), 1);
                assert!(w.grants.is_empty());
                assert!(w.referenced_works.is_none());
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch_is_malformed() {
        let raw = json!({"id": "https://openalex.org/A1"});
        let err = Entity::from_value(EntityType::Works, raw).unwrap_err();
        assert!(err.is_malformed());

        let err = Entity::from_value(EntityType::Works, json!({"display_name": "x"})).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_wrong_field_shape_is_malformed() {
        let raw = json!({"id": "https://openalex.org/W1", "authorships": "nope"});
        assert!(Entity::from_value(EntityType::Works, raw).unwrap_err().is_malformed());
    }

    #[test]
    fn test_from_retained_requires_all_fields() {
        let raw = json!({"id": "https://openalex.org/S1", "display_name": "Nature"});
        assert!(Entity::from_retained(EntityType::Sources, &raw, &["id", "host_organization"]).is_none());

        let raw = json!({"id": "https://openalex.org/S1", "host_organization": "https://openalex.org/P1"});
        let entity = Entity::from_retained(EntityType::Sources, &raw, &["id", "host_organization"]).unwrap();
        match entity.kind() {
            EntityKind::Source(s) => assert_eq!(s.host_organization.as_ref().and_then(Link::id), Some("https://openalex.org/P1")),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_hierarchy_path_ids() {
        let raw = json!({
            "id": "https://openalex.org/fields/17",
            "display_name": "Computer Science",
            "domain": {"id": "https://openalex.org/domains/3"}
        });
        let entity = Entity::from_value(EntityType::Fields, raw).unwrap();
        assert_eq!(entity.node_id(), "fields/17");
    }
}
