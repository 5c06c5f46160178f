//! Upstream metadata provider abstraction
//!
//! Provides a unified interface over the paginated academic-metadata API:
//! - OpenAlex REST client (polite pool, optional API key, outbound pacing)
//! - In-memory mock provider for tests and offline runs

use crate::errors::{AppError, Result};
use crate::metrics::UpstreamTimer;
use crate::query::CompiledQuery;
use crate::types::EntityType;
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Upstream caps page size at this value
pub const MAX_PER_PAGE: u32 = 200;

/// URI prefix of canonical entity ids
pub const OPENALEX_URI_PREFIX: &str = "https://openalex.org/";

/// Parameters for a list/search request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// Free-text search
    pub query: Option<String>,
    /// Compiled `filter=` string
    pub filter: Option<String>,
    /// Compiled `sort=` string
    pub sort: Option<String>,
    /// Page size
    pub per_page: u32,
    /// Field projection for each result
    pub select: Option<Vec<String>>,
}

impl SearchParams {
    pub fn text(query: &str, per_page: u32) -> Self {
        Self {
            query: Some(query.to_string()),
            per_page,
            ..Self::default()
        }
    }

    pub fn from_compiled(compiled: CompiledQuery, default_per_page: u32) -> Self {
        Self {
            query: None,
            filter: compiled.filter,
            sort: compiled.sort,
            per_page: compiled.per_page.unwrap_or(default_per_page),
            select: None,
        }
    }

    pub fn with_select(mut self, fields: &[&str]) -> Self {
        self.select = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

/// Trait for the upstream data provider
#[async_trait]
pub trait EntityProvider: Send + Sync {
    /// Fetch a single entity, optionally restricted to `select` fields
    async fn fetch_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        select: Option<&[&str]>,
    ) -> Result<Value>;

    /// List/search entities of a type
    async fn search_entities(&self, entity_type: EntityType, params: &SearchParams) -> Result<Vec<Value>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Global rate limiter type
pub type OutboundRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// OpenAlex REST client
pub struct OpenAlexProvider {
    client: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
    api_key: Option<String>,
    limiter: Arc<OutboundRateLimiter>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<Value>,
}

impl OpenAlexProvider {
    /// Create a new client
    pub fn new(
        base_url: &str,
        mailto: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("citeforge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto,
            api_key,
            limiter,
            timeout,
        })
    }

    /// Create from the provider section of the application config
    pub fn from_config(config: &crate::config::ProviderConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.mailto.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
            config.requests_per_second,
        )
    }

    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn get_json(&self, url: &str, params: &[(&'static str, String)], entity_type: EntityType, id: &str) -> Result<Value> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            404 => AppError::EntityNotFound {
                entity_type: entity_type.to_string(),
                id: id.to_string(),
            },
            429 => AppError::RateLimited { message: body },
            code => AppError::Upstream { status: code, message: body },
        })
    }

    /// Single-entity URL. Path-style ids (`domains/1`) already carry the type
    /// segment; short ids and `scheme:value` external ids (`doi:10.1038/x`)
    /// go under the type path.
    fn entity_url(&self, entity_type: EntityType, id: &str) -> String {
        match id.split_once('/') {
            Some((segment, rest))
                if entity_type.uses_path_ids() && segment == entity_type.as_str() && !rest.is_empty() =>
            {
                format!("{}/{}", self.base_url, id)
            }
            _ => format!("{}/{}/{}", self.base_url, entity_type.as_str(), id),
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::UpstreamTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            AppError::HttpClient(err)
        }
    }
}

#[async_trait]
impl EntityProvider for OpenAlexProvider {
    async fn fetch_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        select: Option<&[&str]>,
    ) -> Result<Value> {
        let url = self.entity_url(entity_type, id);

        let mut params = self.common_params();
        if let Some(fields) = select {
            params.push(("select", fields.join(",")));
        }

        let timer = UpstreamTimer::start("fetch", entity_type.as_str());
        let result = self.get_json(&url, &params, entity_type, id).await;
        timer.finish(result.is_ok());

        tracing::debug!(
            entity_type = %entity_type,
            id = %id,
            projected = select.is_some(),
            ok = result.is_ok(),
            "Fetched entity"
        );
        result
    }

    async fn search_entities(&self, entity_type: EntityType, params: &SearchParams) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, entity_type.as_str());

        let mut query = self.common_params();
        if let Some(q) = &params.query {
            query.push(("search", q.clone()));
        }
        if let Some(filter) = &params.filter {
            query.push(("filter", filter.clone()));
        }
        if let Some(sort) = &params.sort {
            query.push(("sort", sort.clone()));
        }
        if let Some(select) = &params.select {
            query.push(("select", select.join(",")));
        }
        query.push(("per-page", params.per_page.clamp(1, MAX_PER_PAGE).to_string()));

        let timer = UpstreamTimer::start("search", entity_type.as_str());
        let result = self.get_json(&url, &query, entity_type, "").await;
        timer.finish(result.is_ok());

        let list: ListResponse = serde_json::from_value(result?)?;
        tracing::debug!(
            entity_type = %entity_type,
            filter = ?params.filter,
            results = list.results.len(),
            "Listed entities"
        );
        Ok(list.results)
    }

    fn name(&self) -> &str {
        "openalex"
    }
}

/// A call observed by the mock provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Fetch {
        entity_type: EntityType,
        id: String,
        select: Option<Vec<String>>,
    },
    Search {
        entity_type: EntityType,
        params: SearchParams,
    },
}

#[derive(Default)]
struct MockState {
    entities: HashMap<String, Value>,
    search_results: HashMap<(EntityType, String), Vec<Value>>,
    failing: HashSet<String>,
    calls: Vec<ProviderCall>,
}

/// In-memory provider for testing
///
/// Entities are keyed by their short id (the canonical URI with the
/// `https://openalex.org/` prefix removed). Searches are answered from
/// results registered per `(entity_type, filter-or-query)` key.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
    latency: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, so concurrent callers overlap
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::default(),
            latency: Some(latency),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an entity under the short form of its `id` field
    pub fn insert(&self, entity: Value) {
        let key = entity
            .get("id")
            .and_then(Value::as_str)
            .map(|id| id.trim_start_matches(OPENALEX_URI_PREFIX).to_string())
            .unwrap_or_default();
        self.lock().entities.insert(key, entity);
    }

    /// Register an entity under an explicit fetch id, such as `doi:10.1/x`
    pub fn insert_as(&self, fetch_id: &str, entity: Value) {
        self.lock().entities.insert(fetch_id.to_string(), entity);
    }

    /// Register results for a search keyed by its filter (or free-text query)
    pub fn set_search_results(&self, entity_type: EntityType, key: &str, results: Vec<Value>) {
        self.lock()
            .search_results
            .insert((entity_type, key.to_string()), results);
    }

    /// Make every fetch of `id`, or every search keyed by `id`, fail with an
    /// upstream error
    pub fn fail_id(&self, id: &str) {
        self.lock().failing.insert(id.to_string());
    }

    pub fn recover_id(&self, id: &str) {
        self.lock().failing.remove(id);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// Number of entity fetches issued for `id`
    pub fn fetch_count(&self, id: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProviderCall::Fetch { id: called, .. } if called == id))
            .count()
    }

    pub fn search_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProviderCall::Search { .. }))
            .count()
    }

    fn project(entity: &Value, select: Option<&[String]>) -> Value {
        match (select, entity.as_object()) {
            (Some(fields), Some(object)) => Value::Object(
                object
                    .iter()
                    .filter(|(k, _)| fields.iter().any(|f| f == *k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => entity.clone(),
        }
    }
}

#[async_trait]
impl EntityProvider for MockProvider {
    async fn fetch_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        select: Option<&[&str]>,
    ) -> Result<Value> {
        let select: Option<Vec<String>> = select.map(|s| s.iter().map(|f| f.to_string()).collect());
        self.lock().calls.push(ProviderCall::Fetch {
            entity_type,
            id: id.to_string(),
            select: select.clone(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.lock();
        if state.failing.contains(id) {
            return Err(AppError::Upstream {
                status: 503,
                message: format!("mock failure for {}", id),
            });
        }
        state
            .entities
            .get(id)
            .map(|entity| Self::project(entity, select.as_deref()))
            .ok_or_else(|| AppError::EntityNotFound {
                entity_type: entity_type.to_string(),
                id: id.to_string(),
            })
    }

    async fn search_entities(&self, entity_type: EntityType, params: &SearchParams) -> Result<Vec<Value>> {
        self.lock().calls.push(ProviderCall::Search {
            entity_type,
            params: params.clone(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let key = params
            .filter
            .clone()
            .or_else(|| params.query.clone())
            .unwrap_or_default();
        let state = self.lock();
        if state.failing.contains(&key) {
            return Err(AppError::Upstream {
                status: 503,
                message: format!("mock failure for search {}", key),
            });
        }
        let results = state
            .search_results
            .get(&(entity_type, key))
            .cloned()
            .unwrap_or_default();
        Ok(results
            .iter()
            .take(params.per_page as usize)
            .map(|entity| Self::project(entity, params.select.as_deref()))
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_fetch_projects_fields() {
        let provider = MockProvider::new();
        provider.insert(json!({
            "id": "https://openalex.org/W1",
            "display_name": "Paper",
            "referenced_works": ["https://openalex.org/W2"],
            "abstract_inverted_index": {}
        }));

        let projected = provider
            .fetch_entity(EntityType::Works, "W1", Some(&["id", "referenced_works"]))
            .await
            .unwrap();
        assert!(projected.get("referenced_works").is_some());
        assert!(projected.get("display_name").is_none());
        assert_eq!(provider.fetch_count("W1"), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_and_not_found() {
        let provider = MockProvider::new();
        provider.insert(json!({"id": "https://openalex.org/A1"}));
        provider.fail_id("A1");

        let err = provider.fetch_entity(EntityType::Authors, "A1", None).await.unwrap_err();
        assert!(err.is_upstream());

        provider.recover_id("A1");
        assert!(provider.fetch_entity(EntityType::Authors, "A1", None).await.is_ok());

        let missing = provider.fetch_entity(EntityType::Authors, "A9", None).await.unwrap_err();
        assert!(matches!(missing, AppError::EntityNotFound { .. }));
    }

    #[tokio::test]
    async fn test_mock_search_honours_page_size() {
        let provider = MockProvider::new();
        provider.set_search_results(
            EntityType::Works,
            "cited_by:W1",
            vec![
                json!({"id": "https://openalex.org/W2"}),
                json!({"id": "https://openalex.org/W3"}),
            ],
        );
        let params = SearchParams {
            filter: Some("cited_by:W1".into()),
            per_page: 1,
            ..SearchParams::default()
        };
        let results = provider.search_entities(EntityType::Works, &params).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(provider.search_count(), 1);
    }

    #[test]
    fn test_openalex_client_creation() {
        let provider = OpenAlexProvider::new(
            "https://api.openalex.org/",
            Some("dev@example.org".into()),
            None,
            Duration::from_secs(5),
            0,
        )
        .unwrap();
        assert_eq!(provider.base_url, "https://api.openalex.org");
        assert_eq!(provider.name(), "openalex");
        assert_eq!(provider.common_params().len(), 1);
    }

    #[test]
    fn test_entity_urls() {
        let provider =
            OpenAlexProvider::new("https://api.openalex.org", None, None, Duration::from_secs(5), 10).unwrap();
        let cases = [
            (EntityType::Works, "W2741809807", "https://api.openalex.org/works/W2741809807"),
            (
                EntityType::Works,
                "doi:10.1038/nature12373",
                "https://api.openalex.org/works/doi:10.1038/nature12373",
            ),
            (
                EntityType::Authors,
                "orcid:0000-0002-1825-009X",
                "https://api.openalex.org/authors/orcid:0000-0002-1825-009X",
            ),
            (
                EntityType::Institutions,
                "ror:05dxps055",
                "https://api.openalex.org/institutions/ror:05dxps055",
            ),
            (EntityType::Sources, "issn:1476-4687", "https://api.openalex.org/sources/issn:1476-4687"),
            (EntityType::Domains, "domains/1", "https://api.openalex.org/domains/1"),
            (
                EntityType::Keywords,
                "keywords/deep-learning",
                "https://api.openalex.org/keywords/deep-learning",
            ),
        ];
        for (entity_type, id, expected) in cases {
            assert_eq!(provider.entity_url(entity_type, id), expected, "{}", id);
        }
    }

    #[tokio::test]
    async fn test_mock_serves_entities_by_fetch_id() {
        let provider = MockProvider::new();
        provider.insert_as("doi:10.1038/nature12373", json!({"id": "https://openalex.org/W1"}));
        let entity = provider
            .fetch_entity(EntityType::Works, "doi:10.1038/nature12373", None)
            .await
            .unwrap();
        assert_eq!(entity["id"], "https://openalex.org/W1");
    }
}
