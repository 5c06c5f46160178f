//! Expansion relations
//!
//! Which related entities an expansion pulls in for each type, and the base
//! filter that selects them.

use crate::entity::entity_type_of;
use citeforge_common::types::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionRelation {
    /// Type of the entities fetched
    pub related: EntityType,
    /// Filter property matched against the expanded node's id
    pub filter_property: &'static str,
}

impl ExpansionRelation {
    const fn new(related: EntityType, filter_property: &'static str) -> Self {
        Self {
            related,
            filter_property,
        }
    }

    /// `property:value` selecting the related entities of `node_id`.
    ///
    /// Hierarchy levels are filtered by their numeric id (`domain.id:3`);
    /// keywords keep the `keywords/slug` form the API reports for them.
    pub fn base_filter(&self, node_id: &str) -> String {
        let value = match entity_type_of(node_id) {
            Some(EntityType::Domains | EntityType::Fields | EntityType::Subfields) => {
                node_id.rsplit('/').next().unwrap_or(node_id)
            }
            _ => node_id,
        };
        format!("{}:{}", self.filter_property, value)
    }
}

pub fn relation_for(entity_type: EntityType) -> ExpansionRelation {
    use EntityType::*;
    match entity_type {
        // works a work cites
        Works => ExpansionRelation::new(Works, "cited_by"),
        Authors => ExpansionRelation::new(Works, "authorships.author.id"),
        Sources => ExpansionRelation::new(Works, "primary_location.source.id"),
        Institutions => ExpansionRelation::new(Authors, "last_known_institutions.id"),
        Publishers => ExpansionRelation::new(Sources, "host_organization"),
        Funders => ExpansionRelation::new(Works, "grants.funder"),
        Topics => ExpansionRelation::new(Works, "topics.id"),
        Keywords => ExpansionRelation::new(Works, "keywords.id"),
        Concepts => ExpansionRelation::new(Works, "concepts.id"),
        Domains => ExpansionRelation::new(Fields, "domain.id"),
        Fields => ExpansionRelation::new(Subfields, "field.id"),
        Subfields => ExpansionRelation::new(Topics, "subfield.id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_filters() {
        assert_eq!(relation_for(EntityType::Works).base_filter("W1"), "cited_by:W1");
        assert_eq!(
            relation_for(EntityType::Authors).base_filter("A5023888391"),
            "authorships.author.id:A5023888391"
        );
        assert_eq!(relation_for(EntityType::Domains).base_filter("domains/3"), "domain.id:3");
        assert_eq!(relation_for(EntityType::Institutions).related, EntityType::Authors);
    }

    #[test]
    fn test_keyword_filter_keeps_path_id() {
        let relation = relation_for(EntityType::Keywords);
        assert_eq!(relation.related, EntityType::Works);
        assert_eq!(
            relation.base_filter("keywords/machine-learning"),
            "keywords.id:keywords/machine-learning"
        );
        assert_eq!(relation_for(EntityType::Fields).base_filter("fields/17"), "field.id:17");
        assert_eq!(relation_for(EntityType::Subfields).base_filter("subfields/1702"), "subfield.id:1702");
    }
}
