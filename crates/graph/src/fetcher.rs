//! Deduplicated entity fetching
//!
//! Wraps an [`EntityProvider`] with the [`FetchDeduplicator`] and validates
//! every payload into an [`Entity`] before it is cached, so callers never
//! see unvalidated JSON.

use crate::dedup::{DedupConfig, DedupStats, FetchDeduplicator};
use crate::entity::Entity;
use crate::events::EventSink;
use citeforge_common::errors::Result;
use citeforge_common::provider::{EntityProvider, SearchParams};
use citeforge_common::types::EntityType;
use std::sync::Arc;
use tracing::debug;

/// Field projection passed through to the provider
pub type Projection = Option<&'static [&'static str]>;

/// Cache key of a fetch: the id, plus the projection when one is given
pub fn fetch_key(id: &str, select: Projection) -> String {
    match select {
        Some(fields) => format!("{}?select={}", id, fields.join(",")),
        None => id.to_string(),
    }
}

pub struct EntityFetcher {
    provider: Arc<dyn EntityProvider>,
    dedup: FetchDeduplicator<Arc<Entity>>,
}

impl EntityFetcher {
    pub fn new(provider: Arc<dyn EntityProvider>, config: DedupConfig) -> Self {
        Self {
            provider,
            dedup: FetchDeduplicator::new(config),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.dedup = self.dedup.with_events(events);
        self
    }

    pub fn provider(&self) -> &Arc<dyn EntityProvider> {
        &self.provider
    }

    /// Fetch and validate one entity through the deduplicator
    pub async fn fetch(&self, entity_type: EntityType, id: &str, select: Projection) -> Result<Arc<Entity>> {
        let key = fetch_key(id, select);
        let loader = self.loader(entity_type, id, select);
        self.dedup.get_entity(&key, loader).await
    }

    /// Like [`fetch`](Self::fetch), bypassing and replacing any cached value
    pub async fn refresh(&self, entity_type: EntityType, id: &str, select: Projection) -> Result<Arc<Entity>> {
        let key = fetch_key(id, select);
        let loader = self.loader(entity_type, id, select);
        self.dedup.refresh_entity(&key, loader).await
    }

    fn loader(
        &self,
        entity_type: EntityType,
        id: &str,
        select: Projection,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<Arc<Entity>>> + Send + 'static {
        let provider = Arc::clone(&self.provider);
        let id = id.to_string();
        move || {
            Box::pin(async move {
                let raw = provider.fetch_entity(entity_type, &id, select).await?;
                Entity::from_value(entity_type, raw).map(Arc::new)
            })
        }
    }

    /// List entities; payloads that fail validation are dropped
    pub async fn search(&self, entity_type: EntityType, params: &SearchParams) -> Result<Vec<Entity>> {
        let raw = self.provider.search_entities(entity_type, params).await?;
        let total = raw.len();
        let entities: Vec<Entity> = raw
            .into_iter()
            .filter_map(|value| match Entity::from_value(entity_type, value) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    debug!(entity_type = %entity_type, error = %e, "Skipping malformed search result");
                    None
                }
            })
            .collect();

        debug!(
            entity_type = %entity_type,
            returned = total,
            valid = entities.len(),
            "Search results validated"
        );
        Ok(entities)
    }

    pub fn stats(&self) -> DedupStats {
        self.dedup.stats()
    }

    pub fn clear(&self) {
        self.dedup.clear();
    }
}
