//! Per-type field projections
//!
//! Minimal projections hold exactly the fields relationship detection reads.
//! Metadata projections add the descriptive fields shown for a fully
//! hydrated node without pulling abstracts or yearly count series.

use citeforge_common::types::EntityType;

/// `select` used by the citation fallback
pub const REFERENCE_FIELDS: &[&str] = &["id", "referenced_works"];

pub fn minimal_fields(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Works => &[
            "id",
            "display_name",
            "authorships",
            "primary_location",
            "referenced_works",
            "grants",
            "keywords",
            "concepts",
            "topics",
        ],
        EntityType::Authors => &["id", "display_name", "affiliations", "last_known_institutions", "topics"],
        EntityType::Sources => &["id", "display_name", "host_organization", "topics"],
        EntityType::Institutions => &["id", "display_name", "lineage", "topics"],
        EntityType::Publishers => &["id", "display_name", "lineage", "parent_publisher"],
        EntityType::Funders | EntityType::Keywords => &["id", "display_name"],
        EntityType::Concepts => &["id", "display_name", "ancestors"],
        EntityType::Topics => &["id", "display_name", "subfield", "field", "domain"],
        EntityType::Subfields => &["id", "display_name", "field", "domain", "topics"],
        EntityType::Fields => &["id", "display_name", "domain", "subfields"],
        EntityType::Domains => &["id", "display_name", "fields"],
    }
}

pub fn metadata_fields(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Works => &[
            "id",
            "display_name",
            "title",
            "doi",
            "ids",
            "type",
            "publication_year",
            "publication_date",
            "cited_by_count",
            "open_access",
            "authorships",
            "primary_location",
            "referenced_works",
            "grants",
            "keywords",
            "concepts",
            "topics",
        ],
        EntityType::Authors => &[
            "id",
            "display_name",
            "orcid",
            "ids",
            "works_count",
            "cited_by_count",
            "summary_stats",
            "affiliations",
            "last_known_institutions",
            "topics",
        ],
        EntityType::Sources => &[
            "id",
            "display_name",
            "issn_l",
            "issn",
            "ids",
            "type",
            "works_count",
            "cited_by_count",
            "host_organization",
            "host_organization_name",
            "topics",
        ],
        EntityType::Institutions => &[
            "id",
            "display_name",
            "ror",
            "ids",
            "country_code",
            "type",
            "works_count",
            "cited_by_count",
            "lineage",
            "topics",
        ],
        EntityType::Publishers => &[
            "id",
            "display_name",
            "ids",
            "country_codes",
            "works_count",
            "cited_by_count",
            "lineage",
            "parent_publisher",
        ],
        EntityType::Funders => &["id", "display_name", "ids", "country_code", "description", "grants_count", "works_count"],
        EntityType::Keywords => &["id", "display_name", "works_count", "cited_by_count"],
        EntityType::Concepts => &["id", "display_name", "ids", "level", "description", "works_count", "ancestors"],
        EntityType::Topics => &["id", "display_name", "description", "keywords", "works_count", "subfield", "field", "domain"],
        EntityType::Subfields => &["id", "display_name", "ids", "description", "works_count", "field", "domain", "topics"],
        EntityType::Fields => &["id", "display_name", "ids", "description", "works_count", "domain", "subfields"],
        EntityType::Domains => &["id", "display_name", "ids", "description", "works_count", "fields"],
    }
}
