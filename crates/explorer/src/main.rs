//! CiteForge Explorer
//!
//! Seeds a citation graph from one identifier and prints it as JSON:
//! - Resolves OpenAlex ids, DOIs, ORCIDs, ROR ids and ISSNs
//! - Optionally expands the primary node and hydrates minimal nodes
//! - Exposes Prometheus metrics while running when configured

use anyhow::Context;
use citeforge_common::{config::AppConfig, metrics, provider::OpenAlexProvider, VERSION};
use citeforge_graph::{
    DedupConfig, EntityFetcher, ExpandOptions, GraphMaterializer, InMemoryGraphStore, TracingEventSink,
};
use clap::Parser;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Seed, expand and hydrate a citation graph, then print it as JSON
#[derive(Debug, Parser)]
#[command(name = "explorer")]
#[command(author, version, about = "CiteForge graph explorer", long_about = None)]
struct Args {
    /// OpenAlex id or URI, DOI, ORCID, ROR id or ISSN
    id: String,

    /// Related entities fetched per expansion
    #[arg(long, value_name = "N")]
    expand: Option<u32>,

    /// Expansion levels below the primary node
    #[arg(long, value_name = "D")]
    depth: Option<u32>,

    /// Expand the primary node even if it was already expanded
    #[arg(long)]
    force: bool,

    /// Upgrade minimal nodes to full after loading
    #[arg(long)]
    hydrate: bool,

    /// Hydrate all nodes concurrently instead of paced
    #[arg(long, requires = "hydrate")]
    immediate: bool,

    /// Configuration file used instead of the layered config/ directory
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &AppConfig) -> anyhow::Result<()> {
    metrics::register_metrics();
    let port = config.observability.metrics_port;
    if port == 0 {
        return Ok(());
    }
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::FETCH_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;
    info!(port, "Prometheus exporter listening");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config);
    info!(service = %config.observability.service_name, "Starting CiteForge Explorer v{}", VERSION);

    init_metrics(&config)?;

    let provider = Arc::new(OpenAlexProvider::from_config(&config.provider)?);
    let events = Arc::new(TracingEventSink);
    let fetcher = Arc::new(
        EntityFetcher::new(provider, DedupConfig::from(&config.cache)).with_events(events.clone()),
    );
    let store = Arc::new(InMemoryGraphStore::new());
    let materializer = GraphMaterializer::new(store, fetcher, &config, events);

    let loaded = materializer.load_entity_graph(&args.id).await?;
    info!(primary = %loaded.primary_id, entity_type = %loaded.entity_type, "Loaded primary entity");

    if args.expand.is_some() || args.depth.is_some() || args.force {
        let expanded = materializer
            .expand_node(
                &loaded.primary_id,
                ExpandOptions {
                    limit: args.expand,
                    depth: args.depth,
                    force: args.force,
                },
            )
            .await?;
        info!(added = expanded.added_nodes.len(), edges = expanded.added_edges, "Expanded primary node");
    }

    if args.hydrate {
        let report = if args.immediate {
            materializer.hydrate_all_minimal_nodes_immediate().await
        } else {
            materializer.hydrate_all_minimal_nodes_paced().await
        };
        info!(hydrated = report.hydrated, failed = report.failed, "Hydration sweep finished");
    }

    let output = json!({
        "graph": materializer.snapshot(),
        "stats": materializer.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!("Explorer finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "explorer", "W2741809807", "--expand", "10", "--depth", "2", "--hydrate",
        ])
        .unwrap();
        assert_eq!(args.id, "W2741809807");
        assert_eq!(args.expand, Some(10));
        assert_eq!(args.depth, Some(2));
        assert!(args.hydrate);
        assert!(!args.immediate);
        assert!(!args.force);
        assert!(args.config.is_none());

        let args = Args::try_parse_from(["explorer", "doi:10.1038/x", "--config", "ci.toml"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("ci.toml"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Args::try_parse_from(["explorer"]).is_err());
        assert!(Args::try_parse_from(["explorer", "W1", "--expand"]).is_err());
        assert!(Args::try_parse_from(["explorer", "W1", "--expand", "many"]).is_err());
        assert!(Args::try_parse_from(["explorer", "W1", "--verbose"]).is_err());
        assert!(Args::try_parse_from(["explorer", "W1", "W2"]).is_err());
        assert!(Args::try_parse_from(["explorer", "W1", "--immediate"]).is_err());
    }
}
