//! Expansion query compiler
//!
//! Turns per-entity-type expansion settings (sorts + filters) into the
//! `filter=` and `sort=` parameter strings understood by the upstream API.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One sort clause; lower priority sorts first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortCriteria {
    pub property: String,
    pub direction: SortDirection,
    #[serde(default)]
    pub priority: u32,
}

/// Filter comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Between,
    In,
    NotIn,
}

/// Filter operand as it appears in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Render a single operand, escaping the characters that delimit
    /// clauses (`,`), property/value (`:`) and alternatives (`|`).
    fn render(&self) -> String {
        match self {
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Text(s) => escape_value(s),
            FilterValue::List(values) => render_alternatives(values),
        }
    }

    fn as_slice(&self) -> &[FilterValue] {
        match self {
            FilterValue::List(values) => values,
            single => std::slice::from_ref(single),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Number(value.into())
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Number(value.into())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// One filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub property: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FilterCriteria {
    pub fn new(property: &str, operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
        Self {
            property: property.to_string(),
            operator,
            value: value.into(),
            enabled: true,
        }
    }

    /// Compile to `property:expr`; `None` when disabled or property-less
    pub fn compile(&self) -> Result<Option<String>> {
        let property = self.property.trim();
        if !self.enabled || property.is_empty() {
            return Ok(None);
        }

        let expr = match self.operator {
            FilterOperator::Eq => self.value.render(),
            FilterOperator::Ne => format!("!{}", self.value.render()),
            FilterOperator::Gt => format!(">{}", self.value.render()),
            FilterOperator::Lt => format!("<{}", self.value.render()),
            FilterOperator::Gte => format!(">={}", self.value.render()),
            FilterOperator::Lte => format!("<={}", self.value.render()),
            FilterOperator::Between => match self.value.as_slice() {
                [min, max] => format!("{}-{}", min.render(), max.render()),
                other => {
                    return Err(AppError::InvalidFilter {
                        property: property.to_string(),
                        message: format!("between expects 2 values, got {}", other.len()),
                    })
                }
            },
            FilterOperator::In => render_alternatives(self.value.as_slice()),
            FilterOperator::NotIn => format!("!{}", render_alternatives(self.value.as_slice())),
        };

        Ok(Some(format!("{}:{}", property, expr)))
    }
}

/// Expansion settings for one entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionSettings {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub sorts: Vec<SortCriteria>,
    #[serde(default)]
    pub filters: Vec<FilterCriteria>,
}

/// Compiled query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub per_page: Option<u32>,
}

impl ExpansionSettings {
    /// Compile sorts and filters into query parameter strings
    pub fn compile(&self) -> Result<CompiledQuery> {
        self.compile_with_base(None)
    }

    /// Compile with a relation filter placed ahead of the configured filters
    pub fn compile_with_base(&self, base_filter: Option<&str>) -> Result<CompiledQuery> {
        let mut clauses: Vec<String> = base_filter
            .filter(|b| !b.is_empty())
            .map(|b| vec![b.to_string()])
            .unwrap_or_default();

        for filter in &self.filters {
            if let Some(clause) = filter.compile()? {
                clauses.push(clause);
            }
        }

        let mut sorts: Vec<&SortCriteria> = self
            .sorts
            .iter()
            .filter(|s| !s.property.trim().is_empty())
            .collect();
        sorts.sort_by_key(|s| s.priority);
        let sort = sorts
            .iter()
            .map(|s| format!("{}:{}", s.property.trim(), s.direction.as_str()))
            .collect::<Vec<_>>();

        Ok(CompiledQuery {
            filter: (!clauses.is_empty()).then(|| clauses.join(",")),
            sort: (!sort.is_empty()).then(|| sort.join(",")),
            per_page: self.limit,
        })
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "filter={} sort={} per_page={}",
            self.filter.as_deref().unwrap_or("-"),
            self.sort.as_deref().unwrap_or("-"),
            self.per_page.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
        )
    }
}

fn render_alternatives(values: &[FilterValue]) -> String {
    values.iter().map(FilterValue::render).collect::<Vec<_>>().join("|")
}

fn escape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, ',' | ':' | '|') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_operators() {
        let gt = FilterCriteria::new("cited_by_count", FilterOperator::Gt, 10);
        assert_eq!(gt.compile().unwrap().as_deref(), Some("cited_by_count:>10"));

        let ne = FilterCriteria::new("type", FilterOperator::Ne, "dataset");
        assert_eq!(ne.compile().unwrap().as_deref(), Some("type:!dataset"));

        let lte = FilterCriteria::new("publication_year", FilterOperator::Lte, 1999);
        assert_eq!(lte.compile().unwrap().as_deref(), Some("publication_year:<=1999"));
    }

    #[test]
    fn test_between_requires_pair() {
        let ok = FilterCriteria::new("publication_year", FilterOperator::Between, vec![2010, 2020]);
        assert_eq!(ok.compile().unwrap().as_deref(), Some("publication_year:2010-2020"));

        let bad = FilterCriteria::new("publication_year", FilterOperator::Between, vec![2010]);
        assert!(matches!(bad.compile(), Err(AppError::InvalidFilter { .. })));
    }

    #[test]
    fn test_string_values_are_escaped() {
        let eq = FilterCriteria::new("display_name", FilterOperator::Eq, "Smith, J.");
        assert_eq!(eq.compile().unwrap().as_deref(), Some("display_name:Smith\\, J."));

        let any = FilterCriteria::new("type", FilterOperator::In, vec!["a|b", "c:d"]);
        assert_eq!(any.compile().unwrap().as_deref(), Some("type:a\\|b|c\\:d"));

        let none = FilterCriteria::new("type", FilterOperator::NotIn, vec!["article", "review"]);
        assert_eq!(none.compile().unwrap().as_deref(), Some("type:!article|review"));
    }

    #[test]
    fn test_disabled_and_propertyless_filters_skipped() {
        let mut disabled = FilterCriteria::new("is_oa", FilterOperator::Eq, true);
        disabled.enabled = false;
        let blank = FilterCriteria::new("  ", FilterOperator::Eq, true);

        let settings = ExpansionSettings {
            limit: Some(25),
            sorts: vec![],
            filters: vec![disabled, blank, FilterCriteria::new("is_oa", FilterOperator::Eq, true)],
        };
        let compiled = settings.compile().unwrap();
        assert_eq!(compiled.filter.as_deref(), Some("is_oa:true"));
        assert_eq!(compiled.per_page, Some(25));
    }

    #[test]
    fn test_sorts_ordered_by_priority() {
        let settings = ExpansionSettings {
            limit: None,
            sorts: vec![
                SortCriteria {
                    property: "publication_year".into(),
                    direction: SortDirection::Desc,
                    priority: 2,
                },
                SortCriteria {
                    property: "cited_by_count".into(),
                    direction: SortDirection::Desc,
                    priority: 1,
                },
            ],
            filters: vec![],
        };
        let compiled = settings.compile_with_base(Some("cited_by:W1")).unwrap();
        assert_eq!(compiled.sort.as_deref(), Some("cited_by_count:desc,publication_year:desc"));
        assert_eq!(compiled.filter.as_deref(), Some("cited_by:W1"));
    }

    #[test]
    fn test_settings_deserialize() {
        let json = r#"{
            "limit": 5,
            "sorts": [{"property": "cited_by_count", "direction": "desc"}],
            "filters": [{"property": "publication_year", "operator": "between", "value": [2000, 2010]}]
        }"#;
        let settings: ExpansionSettings = serde_json::from_str(json).unwrap();
        let compiled = settings.compile().unwrap();
        assert_eq!(compiled.filter.as_deref(), Some("publication_year:2000-2010"));
        assert_eq!(compiled.sort.as_deref(), Some("cited_by_count:desc"));
    }
}
