//! Per-kind relationship extraction
//!
//! Each rule reads the relationship-bearing fields of one validated entity
//! and reports relationships to candidates only. The entity owning a field
//! is the semantic source unless the rule says otherwise.

use crate::entity::{normalize_id, Entity, EntityKind, EntityRef};
use crate::model::{DetectedRelationship, RelationDirection, RelationType};
use serde_json::{json, Value};
use std::collections::HashSet;

struct Collector<'a> {
    node_id: &'a str,
    candidates: &'a HashSet<String>,
    seen: HashSet<String>,
    found: Vec<DetectedRelationship>,
}

impl<'a> Collector<'a> {
    fn new(node_id: &'a str, candidates: &'a HashSet<String>) -> Self {
        Self {
            node_id,
            candidates,
            seen: HashSet::new(),
            found: Vec::new(),
        }
    }

    /// Resolve a referenced id to a candidate node, ignoring self-references
    fn other(&self, raw: &str) -> Option<String> {
        let id = normalize_id(raw);
        (id != self.node_id && self.candidates.contains(&id)).then_some(id)
    }

    fn push(
        &mut self,
        other_raw: &str,
        relation_type: RelationType,
        direction: RelationDirection,
        weight: Option<f64>,
        metadata: Option<Value>,
    ) {
        let Some(other) = self.other(other_raw) else {
            return;
        };
        let (source, target) = match direction {
            RelationDirection::Outbound => (self.node_id.to_string(), other),
            RelationDirection::Inbound => (other, self.node_id.to_string()),
        };
        let relationship = DetectedRelationship {
            source_node_id: source,
            target_node_id: target,
            relation_type,
            direction,
            label: relation_type.label().to_string(),
            weight,
            metadata,
        };
        if self.seen.insert(relationship.key()) {
            self.found.push(relationship);
        }
    }

    fn outbound(&mut self, target: &str, relation_type: RelationType) {
        self.push(target, relation_type, RelationDirection::Outbound, None, None);
    }

    fn inbound(&mut self, source: &str, relation_type: RelationType) {
        self.push(source, relation_type, RelationDirection::Inbound, None, None);
    }

    /// Outbound links to scored refs, carrying the score as weight
    fn scored(&mut self, refs: &[EntityRef], relation_type: RelationType) {
        for r in refs {
            if let Some(id) = r.id.as_deref() {
                self.push(id, relation_type, RelationDirection::Outbound, r.score, None);
            }
        }
    }

    fn outbound_ref(&mut self, r: Option<&EntityRef>, relation_type: RelationType) {
        if let Some(id) = r.and_then(|r| r.id.as_deref()) {
            self.outbound(id, relation_type);
        }
    }

    fn inbound_refs(&mut self, refs: &[EntityRef], relation_type: RelationType) {
        for id in refs.iter().filter_map(|r| r.id.as_deref()) {
            self.inbound(id, relation_type);
        }
    }

    fn references(&mut self, referenced: &[String]) {
        for id in referenced {
            self.push(id, RelationType::Reference, RelationDirection::Outbound, Some(1.0), None);
        }
    }
}

/// Relationships between `node_id` (described by `entity`) and `candidates`
pub fn extract_relationships(
    node_id: &str,
    entity: &Entity,
    candidates: &HashSet<String>,
) -> Vec<DetectedRelationship> {
    let mut c = Collector::new(node_id, candidates);

    match entity.kind() {
        EntityKind::Work(work) => {
            for authorship in &work.authorships {
                if let Some(author) = authorship.author.as_ref().and_then(|a| a.id.as_deref()) {
                    let metadata = authorship
                        .author_position
                        .as_ref()
                        .map(|position| json!({ "author_position": position }));
                    c.push(author, RelationType::Authorship, RelationDirection::Inbound, None, metadata);
                }
            }
            let source = work.primary_location.as_ref().and_then(|l| l.source.as_ref());
            c.outbound_ref(source, RelationType::Publication);
            if let Some(referenced) = &work.referenced_works {
                c.references(referenced);
            }
            for grant in &work.grants {
                if let Some(funder) = grant.funder.as_deref() {
                    let metadata = grant.award_id.as_ref().map(|award| json!({ "award_id": award }));
                    c.push(funder, RelationType::FundedBy, RelationDirection::Outbound, None, metadata);
                }
            }
            c.scored(&work.keywords, RelationType::HasKeyword);
            c.scored(&work.concepts, RelationType::HasConcept);
            c.scored(&work.topics, RelationType::HasTopic);
        }
        EntityKind::Author(author) => {
            for affiliation in &author.affiliations {
                if let Some(institution) = affiliation.institution.as_ref().and_then(|i| i.id.as_deref()) {
                    let metadata = (!affiliation.years.is_empty()).then(|| json!({ "years": affiliation.years }));
                    c.push(institution, RelationType::Affiliation, RelationDirection::Outbound, None, metadata);
                }
            }
            for institution in author.last_known_institutions.iter().filter_map(|i| i.id.as_deref()) {
                c.outbound(institution, RelationType::Affiliation);
            }
            c.scored(&author.topics, RelationType::HasTopic);
        }
        EntityKind::Source(source) => {
            if let Some(host) = source.host_organization.as_ref().and_then(|h| h.id()) {
                c.outbound(host, RelationType::HostOrganization);
            }
            c.scored(&source.topics, RelationType::HasTopic);
        }
        EntityKind::Institution(institution) => {
            for parent in &institution.lineage {
                c.outbound(parent, RelationType::Lineage);
            }
            c.scored(&institution.topics, RelationType::HasTopic);
        }
        EntityKind::Publisher(publisher) => {
            for parent in &publisher.lineage {
                c.outbound(parent, RelationType::Lineage);
            }
            if let Some(parent) = publisher.parent_publisher.as_ref().and_then(|p| p.id()) {
                c.outbound(parent, RelationType::Lineage);
            }
        }
        EntityKind::Concept(concept) => {
            for ancestor in concept.ancestors.iter().filter_map(|a| a.id.as_deref()) {
                c.outbound(ancestor, RelationType::Lineage);
            }
        }
        EntityKind::Topic(topic) => {
            c.outbound_ref(topic.subfield.as_ref(), RelationType::Lineage);
        }
        EntityKind::Subfield(subfield) => {
            c.outbound_ref(subfield.field.as_ref(), RelationType::Lineage);
            c.inbound_refs(&subfield.topics, RelationType::Lineage);
        }
        EntityKind::Field(field) => {
            c.outbound_ref(field.domain.as_ref(), RelationType::Lineage);
            c.inbound_refs(&field.subfields, RelationType::Lineage);
        }
        EntityKind::Domain(domain) => {
            c.inbound_refs(&domain.fields, RelationType::Lineage);
        }
        EntityKind::Funder(_) | EntityKind::Keyword(_) => {}
    }

    c.found
}

/// Reference relationships from a dedicated `(id, referenced_works)` fetch
pub fn reference_relationships(
    node_id: &str,
    referenced: &[String],
    candidates: &HashSet<String>,
) -> Vec<DetectedRelationship> {
    let mut c = Collector::new(node_id, candidates);
    c.references(referenced);
    c.found
}

/// A work whose payload did not carry its reference list
pub fn lacks_references(entity: &Entity) -> bool {
    matches!(entity.kind(), EntityKind::Work(work) if work.referenced_works.is_none())
}

/// Referenced work ids, when the payload carries them
pub fn referenced_works(entity: &Entity) -> Option<&[String]> {
    match entity.kind() {
        EntityKind::Work(work) => work.referenced_works.as_deref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeforge_common::types::EntityType;

    fn candidates(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn entity(entity_type: EntityType, raw: Value) -> Entity {
        Entity::from_value(entity_type, raw).unwrap()
    }

    #[test]
    fn test_work_relationships() {
        let work = entity(
            EntityType::Works,
            json!({
                "id": "https://openalex.org/W1",
                "authorships": [
                    {"author": {"id": "https://openalex.org/A1"}, "author_position": "first"},
                    {"author": {"id": "https://openalex.org/A2"}}
                ],
                "primary_location": {"source": {"id": "https://openalex.org/S1"}},
                "referenced_works": ["https://openalex.org/W2", "https://openalex.org/W3", "https://openalex.org/W1"],
                "grants": [{"funder": "https://openalex.org/F1", "award_id": "ABC-1"}],
                "topics": [{"id": "https://openalex.org/T1", "score": 0.97}],
                "keywords": [{"id": "https://openalex.org/keywords/graphs", "score": 0.5}]
            }),
        );
        let present = candidates(&["A1", "S1", "W2", "F1", "T1", "keywords/graphs"]);
        let found = extract_relationships("W1", &work, &present);
        let keys: Vec<String> = found.iter().map(DetectedRelationship::key).collect();

        assert_eq!(
            keys,
            vec![
                "A1-AUTHORSHIP-W1",
                "W1-PUBLICATION-S1",
                "W1-REFERENCE-W2",
                "W1-FUNDED_BY-F1",
                "W1-HAS_KEYWORD-keywords/graphs",
                "W1-HAS_TOPIC-T1",
            ]
        );
        assert_eq!(found[0].direction, RelationDirection::Inbound);
        assert_eq!(found[0].metadata, Some(json!({"author_position": "first"})));
        assert_eq!(found[2].weight, Some(1.0));
        assert_eq!(found[5].weight, Some(0.97));
    }

    #[test]
    fn test_author_affiliations_deduplicate() {
        let author = entity(
            EntityType::Authors,
            json!({
                "id": "https://openalex.org/A1",
                "affiliations": [{"institution": {"id": "https://openalex.org/I1"}, "years": [2023, 2024]}],
                "last_known_institutions": [{"id": "https://openalex.org/I1"}]
            }),
        );
        let found = extract_relationships("A1", &author, &candidates(&["I1"]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key(), "A1-AFFILIATION-I1");
        assert_eq!(found[0].metadata, Some(json!({"years": [2023, 2024]})));
    }

    #[test]
    fn test_institution_lineage_skips_self() {
        let institution = entity(
            EntityType::Institutions,
            json!({
                "id": "https://openalex.org/I2",
                "lineage": ["https://openalex.org/I2", "https://openalex.org/I1"]
            }),
        );
        let found = extract_relationships("I2", &institution, &candidates(&["I1", "I2"]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key(), "I2-LINEAGE-I1");
    }

    #[test]
    fn test_hierarchy_edges_agree_from_both_ends() {
        let field = entity(
            EntityType::Fields,
            json!({
                "id": "https://openalex.org/fields/17",
                "domain": {"id": "https://openalex.org/domains/3"},
                "subfields": [{"id": "https://openalex.org/subfields/1702"}]
            }),
        );
        let domain = entity(
            EntityType::Domains,
            json!({
                "id": "https://openalex.org/domains/3",
                "fields": [{"id": "https://openalex.org/fields/17"}]
            }),
        );

        let from_field = extract_relationships("fields/17", &field, &candidates(&["domains/3", "subfields/1702"]));
        let from_domain = extract_relationships("domains/3", &domain, &candidates(&["fields/17"]));

        let field_keys: Vec<String> = from_field.iter().map(DetectedRelationship::key).collect();
        assert!(field_keys.contains(&"fields/17-LINEAGE-domains/3".to_string()));
        assert!(field_keys.contains(&"subfields/1702-LINEAGE-fields/17".to_string()));
        assert_eq!(from_domain[0].key(), "fields/17-LINEAGE-domains/3");
        assert_eq!(from_domain[0].direction, RelationDirection::Inbound);
    }

    #[test]
    fn test_source_host_as_bare_id() {
        let source = entity(
            EntityType::Sources,
            json!({"id": "https://openalex.org/S1", "host_organization": "https://openalex.org/P4310319965"}),
        );
        let found = extract_relationships("S1", &source, &candidates(&["P4310319965"]));
        assert_eq!(found[0].relation_type, RelationType::HostOrganization);
    }

    #[test]
    fn test_reference_fallback_helpers() {
        let work = entity(EntityType::Works, json!({"id": "https://openalex.org/W1"}));
        assert!(lacks_references(&work));
        assert!(referenced_works(&work).is_none());

        let refs = vec!["https://openalex.org/W2".to_string()];
        let found = reference_relationships("W1", &refs, &candidates(&["W2"]));
        assert_eq!(found[0].key(), "W1-REFERENCE-W2");
    }
}
