use super::*;
use crate::dedup::DedupConfig;
use crate::events::RecordingEventSink;
use crate::model::{HydrationState, RelationType};
use crate::store::InMemoryGraphStore;
use citeforge_common::provider::{MockProvider, ProviderCall};
use std::time::Duration;

struct Harness {
    provider: Arc<MockProvider>,
    store: Arc<InMemoryGraphStore>,
    events: Arc<RecordingEventSink>,
    m: GraphMaterializer,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.hydration.sweep_delay_ms = 1;
    config.hydration.sweep_batch_size = 2;
    config.hydration.sweep_batch_pause_ms = 2;
    config
}

fn harness_with(provider: MockProvider, config: AppConfig) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(InMemoryGraphStore::new());
    let events = Arc::new(RecordingEventSink::new());
    let fetcher = Arc::new(EntityFetcher::new(provider.clone(), DedupConfig::from(&config.cache)));
    let m = GraphMaterializer::new(store.clone(), fetcher, &config, events.clone());
    Harness {
        provider,
        store,
        events,
        m,
    }
}

fn harness() -> Harness {
    harness_with(MockProvider::new(), test_config())
}

fn uri(id: &str) -> String {
    format!("https://openalex.org/{}", id)
}

fn work(id: &str, references: &[&str]) -> Value {
    json!({
        "id": uri(id),
        "display_name": format!("Work {}", id),
        "publication_year": 2020,
        "authorships": [],
        "primary_location": null,
        "referenced_works": references.iter().map(|r| uri(r)).collect::<Vec<_>>(),
        "grants": [],
        "keywords": [],
        "concepts": [],
        "topics": []
    })
}

fn edge_ids(store: &InMemoryGraphStore) -> HashSet<String> {
    store.edges().into_iter().map(|e| e.id).collect()
}

/// W1 cites W2 and W3, W2 cites W3
async fn expanded_citation_graph(h: &Harness) {
    h.provider.insert(work("W1", &["W2", "W3"]));
    h.provider.set_search_results(
        EntityType::Works,
        "cited_by:W1",
        vec![work("W2", &["W3"]), work("W3", &[])],
    );
    h.m.load_entity_graph("W1").await.unwrap();
    h.m.expand_node("W1", ExpandOptions::default()).await.unwrap();
}

#[tokio::test]
async fn test_load_entity_graph_creates_full_primary() {
    let h = harness();
    h.provider.insert(work("W1", &[]));

    let outcome = h.m.load_entity_graph("https://openalex.org/W1").await.unwrap();
    assert_eq!(outcome.primary_id, "W1");
    assert_eq!(outcome.entity_type, EntityType::Works);
    assert_eq!(outcome.nodes, 1);

    let node = h.store.get_node("W1").unwrap();
    assert_eq!(node.hydration_level, HydrationLevel::Full);
    assert_eq!(node.traversal_depth, Some(0));
    assert_eq!(h.m.primary_node().as_deref(), Some("W1"));
    assert!(h.events.contains("load_started"));
    assert!(h.events.contains("load_completed"));
}

#[tokio::test]
async fn test_load_entity_graph_by_doi() {
    let h = harness();
    let mut paper = work("W2741809807", &[]);
    paper["doi"] = json!("https://doi.org/10.1038/nature12373");
    h.provider.insert_as("doi:10.1038/nature12373", paper);

    let outcome = h.m.load_entity_graph("https://doi.org/10.1038/NATURE12373").await.unwrap();
    assert_eq!(outcome.primary_id, "W2741809807");
    assert_eq!(outcome.entity_type, EntityType::Works);
    assert_eq!(h.provider.fetch_count("doi:10.1038/nature12373"), 1);

    let node = h.store.get_node("W2741809807").unwrap();
    assert_eq!(node.hydration_level, HydrationLevel::Full);
    assert!(node.external_ids.iter().any(|e| e.value == "10.1038/nature12373"));
}

#[tokio::test]
async fn test_failed_load_leaves_graph_untouched() {
    let h = harness();
    h.provider.insert(work("W1", &[]));
    h.m.load_entity_graph("W1").await.unwrap();

    let err = h.m.load_entity_graph("definitely not an id").await.unwrap_err();
    assert!(matches!(err, AppError::UnresolvableIdentifier { .. }));

    let err = h.m.load_entity_graph("W404").await.unwrap_err();
    assert!(matches!(err.root(), AppError::EntityNotFound { .. }));

    assert_eq!(h.store.node_ids(), vec!["W1"]);
    assert_eq!(h.m.primary_node().as_deref(), Some("W1"));
    assert!(h.events.contains("load_failed"));
}

#[tokio::test]
async fn test_load_replaces_previous_graph() {
    let h = harness();
    expanded_citation_graph(&h).await;
    h.provider.insert(json!({"id": uri("A1"), "display_name": "Ada"}));

    h.m.load_entity_graph("A1").await.unwrap();
    assert_eq!(h.store.node_ids(), vec!["A1"]);
    assert!(h.store.edges().is_empty());
    assert!(!h.store.is_node_expanded("W1"));
}

#[tokio::test]
async fn test_expand_adds_minimal_related_nodes() {
    let h = harness();
    expanded_citation_graph(&h).await;

    assert_eq!(h.store.node_ids(), vec!["W1", "W2", "W3"]);
    let w2 = h.store.get_node("W2").unwrap();
    assert_eq!(w2.hydration_level, HydrationLevel::Minimal);
    assert!(w2.entity_data.get("publication_year").is_none());
    assert_eq!(w2.traversal_depth, Some(1));

    let edges = edge_ids(&h.store);
    assert!(edges.contains("W1-REFERENCE-W2"));
    assert!(edges.contains("W1-REFERENCE-W3"));
    assert!(edges.contains("W2-REFERENCE-W3"));
    assert_eq!(edges.len(), 3);

    assert!(h.store.is_node_expanded("W1"));
    assert_eq!(h.store.get_node("W1").unwrap().status, NodeStatus::Ready);
    assert_eq!(h.provider.fetch_count("W1"), 1);

    let search = h
        .provider
        .calls()
        .into_iter()
        .find_map(|call| match call {
            ProviderCall::Search { params, .. } => Some(params),
            _ => None,
        })
        .unwrap();
    assert_eq!(search.filter.as_deref(), Some("cited_by:W1"));
    assert_eq!(search.per_page, 25);
    let minimal: Vec<String> = minimal_fields(EntityType::Works).iter().map(|f| f.to_string()).collect();
    assert_eq!(search.select, Some(minimal));
}

#[tokio::test]
async fn test_expanded_node_only_redetects_unless_forced() {
    let h = harness();
    expanded_citation_graph(&h).await;
    assert_eq!(h.provider.search_count(), 1);

    let again = h.m.expand_node("W1", ExpandOptions::default()).await.unwrap();
    assert!(again.skipped);
    assert!(again.added_nodes.is_empty());
    assert_eq!(h.provider.search_count(), 1);
    assert!(h.events.contains("expansion_skipped"));

    let forced = h
        .m
        .expand_node(
            "W1",
            ExpandOptions {
                force: true,
                ..ExpandOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(!forced.skipped);
    assert!(forced.added_nodes.is_empty());
    assert_eq!(h.provider.search_count(), 2);
    assert_eq!(h.store.edges().len(), 3);
}

#[tokio::test]
async fn test_expansion_limit_and_depth() {
    let h = harness();
    h.provider.insert(work("W1", &["W2"]));
    h.provider
        .set_search_results(EntityType::Works, "cited_by:W1", vec![work("W2", &["W5"]), work("W3", &[])]);
    h.provider
        .set_search_results(EntityType::Works, "cited_by:W2", vec![work("W5", &[])]);
    h.m.load_entity_graph("W1").await.unwrap();

    let outcome = h
        .m
        .expand_node(
            "W1",
            ExpandOptions {
                limit: Some(1),
                depth: Some(2),
                force: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.added_nodes, vec!["W2", "W5"]);
    assert!(!h.store.has_node("W3"));
    assert_eq!(h.store.get_node("W5").unwrap().traversal_depth, Some(2));
    assert!(h.store.is_node_expanded("W2"));
    assert!(!h.store.is_node_expanded("W5"));
}

#[tokio::test]
async fn test_expansion_failure_marks_error_and_recovers() {
    let h = harness();
    h.provider.insert(work("W1", &[]));
    h.m.load_entity_graph("W1").await.unwrap();

    h.provider.fail_id("cited_by:W1");
    assert!(h.m.expand_node("W1", ExpandOptions::default()).await.is_err());
    assert_eq!(h.store.get_node("W1").unwrap().hydration_state(), HydrationState::Error);
    assert!(!h.store.is_node_expanded("W1"));

    h.provider.recover_id("cited_by:W1");
    h.m.expand_node("W1", ExpandOptions::default()).await.unwrap();
    assert_eq!(h.store.get_node("W1").unwrap().hydration_state(), HydrationState::Full);
    assert!(h.store.is_node_expanded("W1"));
}

#[tokio::test]
async fn test_expand_unknown_node() {
    let h = harness();
    let err = h.m.expand_node("W9", ExpandOptions::default()).await.unwrap_err();
    assert!(matches!(err, AppError::NodeNotFound { .. }));
}

#[tokio::test]
async fn test_hydrate_minimal_node_to_full() {
    let h = harness();
    expanded_citation_graph(&h).await;
    h.provider.insert(work("W2", &["W3"]));

    h.m.hydrate_node_to_full("W2").await.unwrap();
    let w2 = h.store.get_node("W2").unwrap();
    assert_eq!(w2.hydration_state(), HydrationState::Full);
    assert_eq!(w2.entity_data["publication_year"], json!(2020));
    assert_eq!(h.provider.fetch_count("W2"), 1);

    h.m.hydrate_node_to_full("W2").await.unwrap();
    assert_eq!(h.provider.fetch_count("W2"), 1);
    assert!(h.events.contains("hydration_completed"));
}

#[tokio::test]
async fn test_hydration_failure_then_rehydrate() {
    let h = harness();
    expanded_citation_graph(&h).await;

    h.provider.fail_id("W2");
    assert!(h.m.hydrate_node_to_full("W2").await.is_err());
    let w2 = h.store.get_node("W2").unwrap();
    assert_eq!(w2.hydration_state(), HydrationState::Error);
    assert_eq!(w2.hydration_level, HydrationLevel::Minimal);

    h.provider.recover_id("W2");
    h.provider.insert(work("W2", &["W3"]));
    h.m.hydrate_node_to_full("W2").await.unwrap();
    assert_eq!(h.store.get_node("W2").unwrap().hydration_state(), HydrationState::Full);
}

#[tokio::test]
async fn test_full_node_never_regresses() {
    let h = harness();
    h.provider.insert(work("W1", &[]));
    h.m.load_entity_graph("W1").await.unwrap();
    h.provider.set_search_results(
        EntityType::Works,
        "attention",
        vec![work("W1", &[]), work("W7", &["W1"])],
    );

    let added = h.m.add_search_results(EntityType::Works, "attention", 10).await.unwrap();
    assert_eq!(added, vec!["W7"]);

    let w1 = h.store.get_node("W1").unwrap();
    assert_eq!(w1.hydration_level, HydrationLevel::Full);
    assert!(w1.entity_data.get("publication_year").is_some());
    assert_eq!(h.store.get_node("W7").unwrap().hydration_level, HydrationLevel::Minimal);
    assert!(edge_ids(&h.store).contains("W7-REFERENCE-W1"));
    assert_eq!(h.store.get_node("W7").unwrap().traversal_depth, Some(1));
}

#[tokio::test]
async fn test_paced_sweep_tolerates_failures() {
    let h = harness();
    h.provider.insert(work("W1", &[]));
    h.provider.set_search_results(
        EntityType::Works,
        "cited_by:W1",
        vec![work("W2", &[]), work("W3", &[]), work("W4", &[])],
    );
    h.m.load_entity_graph("W1").await.unwrap();
    h.m.expand_node("W1", ExpandOptions::default()).await.unwrap();
    h.provider.insert(work("W2", &[]));
    h.provider.insert(work("W3", &[]));
    h.provider.fail_id("W4");

    let report = h.m.hydrate_all_minimal_nodes_paced().await;
    assert_eq!(
        report,
        SweepReport {
            attempted: 3,
            hydrated: 2,
            failed: 1,
            skipped: 0
        }
    );
    assert_eq!(h.store.get_node("W4").unwrap().hydration_state(), HydrationState::Error);
    assert_eq!(h.m.stats().full_nodes, 3);
}

#[tokio::test]
async fn test_immediate_sweep_tolerates_failures() {
    let h = harness();
    h.provider.insert(work("W1", &[]));
    h.provider.set_search_results(
        EntityType::Works,
        "cited_by:W1",
        vec![work("W2", &[]), work("W3", &[])],
    );
    h.m.load_entity_graph("W1").await.unwrap();
    h.m.expand_node("W1", ExpandOptions::default()).await.unwrap();
    h.provider.insert(work("W2", &[]));
    h.provider.fail_id("W3");

    let report = h.m.hydrate_all_minimal_nodes_immediate().await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.hydrated, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(h.m.stats().error_nodes, 1);
}

#[tokio::test]
async fn test_concurrent_hydrations_share_one_fetch() {
    let h = harness_with(MockProvider::with_latency(Duration::from_millis(10)), test_config());
    expanded_citation_graph(&h).await;
    h.provider.insert(work("W2", &["W3"]));

    let (a, b) = tokio::join!(h.m.hydrate_node_to_full("W2"), h.m.hydrate_node_to_full("W2"));
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(h.provider.fetch_count("W2"), 1);
    assert_eq!(h.m.stats().pending_fetches, 0);
}

#[tokio::test]
async fn test_refresh_node_refetches() {
    let h = harness();
    h.provider.insert(work("W1", &[]));
    h.m.load_entity_graph("W1").await.unwrap();

    let mut renamed = work("W1", &[]);
    renamed["display_name"] = json!("Renamed");
    h.provider.insert(renamed);

    h.m.hydrate_node_to_full("W1").await.unwrap();
    assert_eq!(h.provider.fetch_count("W1"), 1);

    h.m.refresh_node("W1").await.unwrap();
    assert_eq!(h.provider.fetch_count("W1"), 2);
    assert_eq!(h.store.get_node("W1").unwrap().label, "Renamed");
}

#[tokio::test]
async fn test_metadata_hydration_uses_projection() {
    let mut config = test_config();
    config.hydration.mode = HydrationMode::Metadata;
    let h = harness_with(MockProvider::new(), config);
    expanded_citation_graph(&h).await;
    h.provider.insert(work("W2", &["W3"]));

    h.m.hydrate_node_to_full("W2").await.unwrap();
    let expected: Vec<String> = metadata_fields(EntityType::Works).iter().map(|f| f.to_string()).collect();
    assert!(matches!(
        h.provider.calls().last(),
        Some(ProviderCall::Fetch { id, select: Some(fields), .. }) if id == "W2" && *fields == expected
    ));
    assert_eq!(h.store.get_node("W2").unwrap().hydration_level, HydrationLevel::Full);
}

#[tokio::test]
async fn test_detect_all_is_idempotent() {
    let h = harness();
    expanded_citation_graph(&h).await;

    assert_eq!(h.m.detect_all().await, 0);
    assert_eq!(h.store.edges().len(), 3);
    assert!(h
        .store
        .edges()
        .iter()
        .all(|e| e.relation_type == RelationType::Reference));
}

#[tokio::test]
async fn test_snapshot_serializes() {
    let h = harness();
    expanded_citation_graph(&h).await;

    let snapshot = serde_json::to_value(h.m.snapshot()).unwrap();
    assert_eq!(snapshot["primary"], json!("W1"));
    assert_eq!(snapshot["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(snapshot["edges"].as_array().unwrap().len(), 3);
    assert_eq!(snapshot["nodes"][1]["hydration_level"], json!("minimal"));
}
