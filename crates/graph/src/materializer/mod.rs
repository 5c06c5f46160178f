//! Graph materialization
//!
//! Loads a primary entity, expands nodes into their related entities and
//! upgrades minimal nodes to full ones. All graph state lives in the
//! injected [`GraphStore`]; the only suspension points are entity fetches.

pub mod expansion;
pub mod transform;

use crate::dedup::DedupStats;
use crate::detector::RelationshipDetector;
use crate::entity::projection::{metadata_fields, minimal_fields};
use crate::entity::resolve;
use crate::events::{EventCategory, EventSink, GraphEvent, MATERIALIZER};
use crate::fetcher::{EntityFetcher, Projection};
use crate::model::{GraphEdge, GraphNode, HydrationLevel, NodeStatus};
use crate::store::{GraphStore, NodeUpdate};
use citeforge_common::config::{AppConfig, HydrationMode};
use citeforge_common::errors::{AppError, Result};
use citeforge_common::metrics::{record_hydration, record_nodes_added};
use citeforge_common::provider::SearchParams;
use citeforge_common::types::EntityType;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

pub use expansion::{relation_for, ExpansionRelation};
pub use transform::{transform_entity_to_graph, GraphFragment};

/// Options for [`GraphMaterializer::expand_node`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Related entities per expansion; falls back to the configured limit
    pub limit: Option<u32>,
    /// Levels to expand; falls back to the configured depth
    pub depth: Option<u32>,
    /// Expand again even when the node was already expanded
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub primary_id: String,
    pub entity_type: EntityType,
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpandOutcome {
    pub node_id: String,
    /// Nodes created, across every level
    pub added_nodes: Vec<String>,
    pub added_edges: usize,
    /// The node was already expanded, only detection ran
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub hydrated: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub primary: Option<String>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub minimal_nodes: usize,
    pub full_nodes: usize,
    pub error_nodes: usize,
    pub pending_fetches: usize,
    pub cached_entities: usize,
}

enum HydrateOutcome {
    Hydrated,
    Skipped,
}

/// Orchestrates fetching, node derivation and relationship detection
pub struct GraphMaterializer {
    store: Arc<dyn GraphStore>,
    fetcher: Arc<EntityFetcher>,
    detector: RelationshipDetector,
    config: AppConfig,
    events: Arc<dyn EventSink>,
    primary: Mutex<Option<String>>,
}

impl GraphMaterializer {
    pub fn new(
        store: Arc<dyn GraphStore>,
        fetcher: Arc<EntityFetcher>,
        config: &AppConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let detector = RelationshipDetector::new(Arc::clone(&store), Arc::clone(&fetcher), Arc::clone(&events));
        Self {
            store,
            fetcher,
            detector,
            config: config.clone(),
            events,
            primary: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn detector(&self) -> &RelationshipDetector {
        &self.detector
    }

    pub fn primary_node(&self) -> Option<String> {
        self.primary.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_primary(&self, id: Option<String>) {
        *self.primary.lock().unwrap_or_else(PoisonError::into_inner) = id;
    }

    fn emit(&self, category: EventCategory, name: &str, payload: Value) {
        self.events
            .emit(GraphEvent::new(category, MATERIALIZER, name, payload));
    }

    /// Replace the graph with `input` as its primary node.
    ///
    /// `input` may be an OpenAlex id or URI, a DOI, ORCID, ROR id or ISSN.
    /// Nothing is mutated when resolution or the fetch fails.
    #[instrument(skip(self))]
    pub async fn load_entity_graph(&self, input: &str) -> Result<LoadOutcome> {
        let resolved = match resolve(input) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.emit(EventCategory::Load, "load_failed", json!({ "input": input, "error": e.to_string() }));
                return Err(e);
            }
        };
        self.emit(
            EventCategory::Load,
            "load_started",
            json!({ "input": input, "entity_type": resolved.entity_type, "fetch_id": resolved.fetch_id }),
        );

        let entity = match self.fetcher.fetch(resolved.entity_type, &resolved.fetch_id, None).await {
            Ok(entity) => entity,
            Err(e) => {
                warn!(input = %input, error = %e, "Failed to load entity");
                self.emit(EventCategory::Load, "load_failed", json!({ "input": input, "error": e.to_string() }));
                return Err(e);
            }
        };

        self.store.clear();
        let fragment = transform_entity_to_graph(&entity, HydrationLevel::Full, &HashSet::new());
        let primary_id = entity.node_id();
        self.set_primary(Some(primary_id.clone()));

        let added = self.store.add_nodes(fragment.nodes);
        self.store.add_edges(fragment.edges);
        record_nodes_added("load", added.len());

        self.detect_and_commit(&self.store.node_ids()).await;
        self.recompute_depths();

        let outcome = LoadOutcome {
            primary_id,
            entity_type: resolved.entity_type,
            nodes: self.store.node_ids().len(),
            edges: self.store.edges().len(),
        };
        info!(primary = %outcome.primary_id, nodes = outcome.nodes, edges = outcome.edges, "Entity graph loaded");
        self.emit(EventCategory::Load, "load_completed", json!(outcome));
        Ok(outcome)
    }

    /// Pull a node's related entities into the graph.
    ///
    /// With `depth > 1` the nodes added at each level are expanded in turn.
    /// `force` applies to the requested node only.
    #[instrument(skip(self, options), fields(limit = ?options.limit, depth = ?options.depth, force = options.force))]
    pub async fn expand_node(&self, node_id: &str, options: ExpandOptions) -> Result<ExpandOutcome> {
        if !self.store.has_node(node_id) {
            return Err(AppError::NodeNotFound { id: node_id.to_string() });
        }
        let depth = options.depth.unwrap_or(self.config.expansion.default_depth).max(1);

        let mut total = ExpandOutcome {
            node_id: node_id.to_string(),
            ..ExpandOutcome::default()
        };
        let mut frontier = vec![node_id.to_string()];

        for level in 0..depth {
            let mut next = Vec::new();
            for id in &frontier {
                let force = options.force && level == 0;
                match self.expand_once(id, options.limit, force).await {
                    Ok(outcome) => {
                        if level == 0 {
                            total.skipped = outcome.skipped;
                        }
                        total.added_edges += outcome.added_edges;
                        next.extend(outcome.added_nodes.iter().cloned());
                        total.added_nodes.extend(outcome.added_nodes);
                    }
                    Err(e) if level == 0 => return Err(e),
                    Err(e) => warn!(node_id = %id, level, error = %e, "Nested expansion failed"),
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        self.recompute_depths();
        Ok(total)
    }

    async fn expand_once(&self, node_id: &str, limit: Option<u32>, force: bool) -> Result<ExpandOutcome> {
        let node = self
            .store
            .get_node(node_id)
            .ok_or_else(|| AppError::NodeNotFound { id: node_id.to_string() })?;

        if self.store.is_node_expanded(node_id) && !force {
            debug!(node_id = %node_id, "Already expanded, re-running detection only");
            let added_edges = self.detect_all().await;
            self.emit(
                EventCategory::Expansion,
                "expansion_skipped",
                json!({ "node_id": node_id, "added_edges": added_edges }),
            );
            return Ok(ExpandOutcome {
                node_id: node_id.to_string(),
                added_nodes: Vec::new(),
                added_edges,
                skipped: true,
            });
        }

        let relation = relation_for(node.entity_type);
        let mut settings = self.config.expansion_settings(relation.related);
        if limit.is_some() {
            settings.limit = limit;
        }
        let compiled = settings.compile_with_base(Some(relation.base_filter(node_id).as_str()))?;
        let params = SearchParams::from_compiled(compiled, self.config.expansion.default_limit)
            .with_select(minimal_fields(relation.related));

        self.emit(
            EventCategory::Expansion,
            "expansion_started",
            json!({ "node_id": node_id, "related": relation.related, "filter": params.filter, "per_page": params.per_page }),
        );
        self.store.mark_node_as_loading(node_id);

        let related = match self.fetcher.search(relation.related, &params).await {
            Ok(related) => related,
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Expansion fetch failed");
                self.store.mark_node_as_error(node_id, &e.to_string());
                self.emit(
                    EventCategory::Expansion,
                    "expansion_failed",
                    json!({ "node_id": node_id, "error": e.to_string() }),
                );
                return Err(e);
            }
        };

        let mut present: HashSet<String> = self.store.node_ids().into_iter().collect();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for entity in &related {
            let id = entity.node_id();
            if present.contains(&id) {
                continue;
            }
            let fragment = transform_entity_to_graph(entity, HydrationLevel::Minimal, &present);
            present.insert(id);
            nodes.extend(fragment.nodes);
            edges.extend(fragment.edges);
        }

        let added = self.store.add_nodes(nodes);
        let mut added_edges = self.store.add_edges(edges);
        record_nodes_added("expand", added.len());

        let mut batch = added.clone();
        batch.push(node_id.to_string());
        added_edges += self.detect_and_commit(&batch).await;

        self.store.mark_node_expanded(node_id);
        self.store.mark_node_as_loaded(node_id);

        if force {
            added_edges += self.detect_all().await;
        }

        info!(node_id = %node_id, fetched = related.len(), added = added.len(), added_edges, "Node expanded");
        self.emit(
            EventCategory::Expansion,
            "expansion_completed",
            json!({ "node_id": node_id, "added_nodes": added, "added_edges": added_edges }),
        );

        Ok(ExpandOutcome {
            node_id: node_id.to_string(),
            added_nodes: added,
            added_edges,
            skipped: false,
        })
    }

    /// Upgrade a node to full; a node already full and healthy is left alone
    #[instrument(skip(self))]
    pub async fn hydrate_node_to_full(&self, node_id: &str) -> Result<()> {
        self.hydrate(node_id, false).await.map(|_| ())
    }

    /// Refetch a node bypassing the cache and re-apply it
    #[instrument(skip(self))]
    pub async fn refresh_node(&self, node_id: &str) -> Result<()> {
        self.hydrate(node_id, true).await.map(|_| ())
    }

    async fn hydrate(&self, node_id: &str, refresh: bool) -> Result<HydrateOutcome> {
        let node = self
            .store
            .get_node(node_id)
            .ok_or_else(|| AppError::NodeNotFound { id: node_id.to_string() })?;
        if !refresh && node.hydration_level == HydrationLevel::Full && !node.is_error() {
            return Ok(HydrateOutcome::Skipped);
        }

        let select: Projection = match self.config.hydration.mode {
            HydrationMode::Full => None,
            HydrationMode::Metadata => Some(metadata_fields(node.entity_type)),
        };

        self.store.mark_node_as_loading(node_id);
        self.emit(
            EventCategory::Hydration,
            "hydration_started",
            json!({ "node_id": node_id, "refresh": refresh }),
        );

        let fetched = if refresh {
            self.fetcher.refresh(node.entity_type, node_id, select).await
        } else {
            self.fetcher.fetch(node.entity_type, node_id, select).await
        };

        match fetched {
            Ok(entity) => {
                let hydrated = GraphNode::from_entity(&entity, HydrationLevel::Full);
                if !self.store.update_node(node_id, NodeUpdate::from_node(&hydrated)) {
                    debug!(node_id = %node_id, "Node removed while hydrating");
                    return Ok(HydrateOutcome::Skipped);
                }
                self.store.mark_node_as_loaded(node_id);
                record_hydration(true);
                self.emit(EventCategory::Hydration, "hydration_completed", json!({ "node_id": node_id }));

                self.detect_and_commit(&[node_id.to_string()]).await;
                Ok(HydrateOutcome::Hydrated)
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Hydration failed");
                self.store.mark_node_as_error(node_id, &e.to_string());
                record_hydration(false);
                self.emit(
                    EventCategory::Hydration,
                    "hydration_failed",
                    json!({ "node_id": node_id, "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    fn minimal_node_ids(&self) -> Vec<String> {
        self.store
            .nodes()
            .into_iter()
            .filter(|n| n.hydration_level == HydrationLevel::Minimal && n.status != NodeStatus::Loading)
            .map(|n| n.id)
            .collect()
    }

    fn tally(report: &mut SweepReport, node_id: &str, result: Result<HydrateOutcome>) {
        match result {
            Ok(HydrateOutcome::Hydrated) => report.hydrated += 1,
            Ok(HydrateOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                debug!(node_id = %node_id, error = %e, "Sweep hydration failed");
                report.failed += 1;
            }
        }
    }

    /// Hydrate every minimal node one at a time, pausing between nodes and
    /// longer between batches
    #[instrument(skip(self))]
    pub async fn hydrate_all_minimal_nodes_paced(&self) -> SweepReport {
        let ids = self.minimal_node_ids();
        let hydration = &self.config.hydration;
        let batch_size = hydration.sweep_batch_size.max(1);
        let mut report = SweepReport {
            attempted: ids.len(),
            ..SweepReport::default()
        };
        self.emit(EventCategory::Hydration, "sweep_started", json!({ "mode": "paced", "nodes": ids.len() }));

        for (index, id) in ids.iter().enumerate() {
            if index > 0 {
                let pause = if index % batch_size == 0 {
                    hydration.sweep_batch_pause()
                } else {
                    hydration.sweep_delay()
                };
                tokio::time::sleep(pause).await;
            }
            let result = self.hydrate(id, false).await;
            Self::tally(&mut report, id, result);
        }

        info!(?report, "Paced hydration sweep finished");
        self.emit(EventCategory::Hydration, "sweep_completed", json!(report));
        report
    }

    /// Hydrate every minimal node concurrently and wait for all of them
    #[instrument(skip(self))]
    pub async fn hydrate_all_minimal_nodes_immediate(&self) -> SweepReport {
        let ids = self.minimal_node_ids();
        let mut report = SweepReport {
            attempted: ids.len(),
            ..SweepReport::default()
        };
        self.emit(EventCategory::Hydration, "sweep_started", json!({ "mode": "immediate", "nodes": ids.len() }));

        let results = futures::future::join_all(ids.iter().map(|id| self.hydrate(id, false))).await;
        for (id, result) in ids.iter().zip(results) {
            Self::tally(&mut report, id, result);
        }

        info!(?report, "Immediate hydration sweep finished");
        self.emit(EventCategory::Hydration, "sweep_completed", json!(report));
        report
    }

    /// Add search results as minimal nodes; returns the ids added
    #[instrument(skip(self))]
    pub async fn add_search_results(&self, entity_type: EntityType, query: &str, limit: u32) -> Result<Vec<String>> {
        let params = SearchParams::text(query, limit).with_select(minimal_fields(entity_type));
        let results = self.fetcher.search(entity_type, &params).await?;

        let mut present: HashSet<String> = self.store.node_ids().into_iter().collect();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for entity in &results {
            let id = entity.node_id();
            if present.contains(&id) {
                continue;
            }
            let fragment = transform_entity_to_graph(entity, HydrationLevel::Minimal, &present);
            present.insert(id);
            nodes.extend(fragment.nodes);
            edges.extend(fragment.edges);
        }

        let added = self.store.add_nodes(nodes);
        self.store.add_edges(edges);
        record_nodes_added("search", added.len());
        self.detect_and_commit(&added).await;
        self.recompute_depths();

        self.emit(
            EventCategory::Store,
            "search_results_added",
            json!({ "entity_type": entity_type, "query": query, "added": added.len() }),
        );
        Ok(added)
    }

    /// Re-run detection across every node; returns the edges added
    pub async fn detect_all(&self) -> usize {
        let ids = self.store.node_ids();
        self.detect_and_commit(&ids).await
    }

    async fn detect_and_commit(&self, ids: &[String]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let edges = self.detector.detect_for_nodes(ids).await;
        let detected = edges.len();
        let added = self.store.add_edges(edges);
        debug!(detected, added, "Committed detected edges");
        if added > 0 {
            self.emit(EventCategory::Store, "edges_committed", json!({ "added": added }));
        }
        added
    }

    /// Undirected BFS distance of every node from the primary node
    pub fn recompute_depths(&self) {
        let primary = self.primary_node();
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for edge in self.store.edges() {
            adjacency.entry(edge.source.clone()).or_default().push(edge.target.clone());
            adjacency.entry(edge.target).or_default().push(edge.source);
        }

        let mut depths: HashMap<String, u32> = HashMap::new();
        if let Some(root) = primary.filter(|p| self.store.has_node(p)) {
            let mut queue = VecDeque::from([(root.clone(), 0u32)]);
            depths.insert(root, 0);
            while let Some((id, depth)) = queue.pop_front() {
                for next in adjacency.get(&id).into_iter().flatten() {
                    if !depths.contains_key(next) {
                        depths.insert(next.clone(), depth + 1);
                        queue.push_back((next.clone(), depth + 1));
                    }
                }
            }
        }

        for node in self.store.nodes() {
            let depth = depths.get(&node.id).copied();
            if node.traversal_depth != depth {
                self.store.update_node(
                    &node.id,
                    NodeUpdate {
                        traversal_depth: Some(depth),
                        ..NodeUpdate::default()
                    },
                );
            }
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            primary: self.primary_node(),
            nodes: self.store.nodes(),
            edges: self.store.edges(),
        }
    }

    pub fn stats(&self) -> GraphStats {
        let nodes = self.store.nodes();
        let dedup: DedupStats = self.fetcher.stats();
        GraphStats {
            nodes: nodes.len(),
            edges: self.store.edges().len(),
            minimal_nodes: nodes.iter().filter(|n| n.hydration_level == HydrationLevel::Minimal).count(),
            full_nodes: nodes.iter().filter(|n| n.hydration_level == HydrationLevel::Full).count(),
            error_nodes: nodes.iter().filter(|n| n.is_error()).count(),
            pending_fetches: dedup.pending_requests,
            cached_entities: dedup.cached_entries,
        }
    }
}

#[cfg(test)]
mod tests;
