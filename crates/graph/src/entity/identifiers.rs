//! Identifier normalization and resolution
//!
//! Graph keys are short OpenAlex ids (`W2741809807`) or, for kinds without a
//! letter prefix, `type/slug` paths (`domains/1`, `keywords/deep-learning`).
//! User input may also be a DOI, ORCID, ROR id or ISSN.

use crate::model::{ExternalId, ExternalIdType};
use citeforge_common::errors::{AppError, Result};
use citeforge_common::types::EntityType;
use regex_lite::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const URI_PREFIXES: &[&str] = &[
    "https://openalex.org/",
    "http://openalex.org/",
    "https://api.openalex.org/",
    "http://api.openalex.org/",
    "openalex.org/",
];

fn short_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([WASITPFCwasitpfc])(\d+)$").expect("valid short id pattern"))
}

fn doi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|doi:)?(10\.\d{4,9}/\S+)$").expect("valid DOI pattern")
    })
}

fn orcid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?://orcid\.org/|orcid:)?(\d{4}-\d{4}-\d{4}-\d{3}[\dX])$").expect("valid ORCID pattern")
    })
}

fn ror_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?://ror\.org/|ror:)(0[a-z0-9]{6}\d{2})$").expect("valid ROR pattern")
    })
}

fn issn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^(?:issn:)?(\d{4}-\d{3}[\dX])$").expect("valid ISSN pattern"))
}

/// Reduce any OpenAlex id form to its graph key
pub fn normalize_id(raw: &str) -> String {
    let mut id = raw.trim();
    for prefix in URI_PREFIXES {
        if let Some(rest) = id.strip_prefix(prefix) {
            id = rest;
            break;
        }
    }
    let id = id.trim_end_matches('/');

    if let Some((segment, rest)) = id.split_once('/') {
        if let Ok(entity_type) = segment.parse::<EntityType>() {
            // `works/W1` is the API path form of a short id
            if let Some(caps) = short_id_pattern().captures(rest) {
                return format!("{}{}", caps[1].to_ascii_uppercase(), &caps[2]);
            }
            return format!("{}/{}", entity_type.as_str(), rest);
        }
        return id.to_string();
    }

    match short_id_pattern().captures(id) {
        Some(caps) => format!("{}{}", caps[1].to_ascii_uppercase(), &caps[2]),
        None => id.to_string(),
    }
}

/// Entity type of a normalized graph key
pub fn entity_type_of(id: &str) -> Option<EntityType> {
    if let Some((segment, rest)) = id.split_once('/') {
        let entity_type = segment.parse::<EntityType>().ok()?;
        return (entity_type.uses_path_ids() && !rest.is_empty()).then_some(entity_type);
    }
    let caps = short_id_pattern().captures(id)?;
    caps[1].chars().next().and_then(EntityType::from_prefix)
}

/// Result of resolving user input to something fetchable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentifier {
    pub entity_type: EntityType,
    /// Id to pass to the provider (`W1`, `doi:10.1/x`, `domains/3`)
    pub fetch_id: String,
    /// Set when the input was an external identifier
    pub external: Option<ExternalIdType>,
}

/// Map user input to an entity type and fetchable id
pub fn resolve(input: &str) -> Result<ResolvedIdentifier> {
    let trimmed = input.trim();
    let unresolvable = || AppError::UnresolvableIdentifier {
        input: input.to_string(),
    };
    if trimmed.is_empty() {
        return Err(unresolvable());
    }

    let normalized = normalize_id(trimmed);
    if let Some(entity_type) = entity_type_of(&normalized) {
        return Ok(ResolvedIdentifier {
            entity_type,
            fetch_id: normalized,
            external: None,
        });
    }

    let external: [(&Regex, EntityType, ExternalIdType, &str); 4] = [
        (doi_pattern(), EntityType::Works, ExternalIdType::Doi, "doi"),
        (orcid_pattern(), EntityType::Authors, ExternalIdType::Orcid, "orcid"),
        (ror_pattern(), EntityType::Institutions, ExternalIdType::Ror, "ror"),
        (issn_pattern(), EntityType::Sources, ExternalIdType::Issn, "issn"),
    ];
    for (pattern, entity_type, id_type, scheme) in external {
        if let Some(caps) = pattern.captures(trimmed) {
            let value = match id_type {
                ExternalIdType::Doi | ExternalIdType::Ror => caps[1].to_ascii_lowercase(),
                _ => caps[1].to_ascii_uppercase(),
            };
            return Ok(ResolvedIdentifier {
                entity_type,
                fetch_id: format!("{}:{}", scheme, value),
                external: Some(id_type),
            });
        }
    }

    Err(unresolvable())
}

/// Collect external identifiers from a raw payload (`ids` object and
/// top-level shortcuts such as `doi`, `orcid`, `ror`, `issn_l`)
pub fn external_ids(raw: &Value) -> Vec<ExternalId> {
    let mut out: Vec<ExternalId> = Vec::new();
    let mut push = |id_type: ExternalIdType, value: &str| {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let external = ExternalId::new(id_type, value);
        if !out.iter().any(|e| e.id_type == external.id_type && e.value == external.value) {
            out.push(external);
        }
    };

    let fields: [(&str, ExternalIdType); 9] = [
        ("doi", ExternalIdType::Doi),
        ("orcid", ExternalIdType::Orcid),
        ("ror", ExternalIdType::Ror),
        ("issn_l", ExternalIdType::Issn),
        ("mag", ExternalIdType::Mag),
        ("pmid", ExternalIdType::Pmid),
        ("pmcid", ExternalIdType::Pmcid),
        ("wikidata", ExternalIdType::Wikidata),
        ("wikipedia", ExternalIdType::Wikipedia),
    ];

    let sources = [raw.get("ids"), Some(raw)];
    for source in sources.into_iter().flatten() {
        for (key, id_type) in fields {
            match source.get(key) {
                Some(Value::String(s)) => push(id_type, s),
                Some(Value::Number(n)) => push(id_type, &n.to_string()),
                _ => {}
            }
        }
        if let Some(Value::Array(issns)) = source.get("issn") {
            for issn in issns.iter().filter_map(Value::as_str) {
                push(ExternalIdType::Issn, issn);
            }
        }
    }
    out
}
