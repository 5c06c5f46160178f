//! Metrics and observability utilities
//!
//! Provides Prometheus-compatible metrics with standardized naming
//! conventions for upstream fetches, deduplication, detection and hydration.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all CiteForge metrics
pub const METRICS_PREFIX: &str = "citeforge";

/// Histogram buckets for upstream fetch latency (in seconds)
pub const FETCH_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Upstream metrics
    describe_counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total upstream API requests"
    );

    describe_histogram!(
        format!("{}_upstream_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Upstream API latency in seconds"
    );

    // Deduplicator metrics
    describe_counter!(
        format!("{}_dedup_lookups_total", METRICS_PREFIX),
        Unit::Count,
        "Entity lookups by outcome (hit, coalesced, fetch)"
    );

    describe_gauge!(
        format!("{}_dedup_pending_requests", METRICS_PREFIX),
        Unit::Count,
        "In-flight entity fetches"
    );

    // Graph metrics
    describe_counter!(
        format!("{}_relationships_detected_total", METRICS_PREFIX),
        Unit::Count,
        "Relationships emitted by the detector"
    );

    describe_counter!(
        format!("{}_nodes_added_total", METRICS_PREFIX),
        Unit::Count,
        "Nodes added to the graph"
    );

    describe_counter!(
        format!("{}_hydrations_total", METRICS_PREFIX),
        Unit::Count,
        "Node hydrations by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record upstream request metrics
pub struct UpstreamTimer {
    start: Instant,
    operation: &'static str,
    entity_type: String,
}

impl UpstreamTimer {
    /// Start tracking an upstream request
    pub fn start(operation: &'static str, entity_type: &str) -> Self {
        Self {
            start: Instant::now(),
            operation,
            entity_type: entity_type.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed().as_secs_f64();
        let status = if success { "success" } else { "error" };

        counter!(
            format!("{}_upstream_requests_total", METRICS_PREFIX),
            "operation" => self.operation,
            "entity_type" => self.entity_type.clone(),
            "status" => status
        )
        .increment(1);

        histogram!(
            format!("{}_upstream_duration_seconds", METRICS_PREFIX),
            "operation" => self.operation,
            "entity_type" => self.entity_type
        )
        .record(duration);
    }
}

/// Helper to record a deduplicator lookup
pub fn record_dedup(outcome: &'static str, pending: usize) {
    counter!(
        format!("{}_dedup_lookups_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    gauge!(format!("{}_dedup_pending_requests", METRICS_PREFIX)).set(pending as f64);
}

/// Helper to record detection output
pub fn record_detection(pass: &'static str, relationships: usize) {
    counter!(
        format!("{}_relationships_detected_total", METRICS_PREFIX),
        "pass" => pass
    )
    .increment(relationships as u64);
}

/// Helper to record nodes added by an operation
pub fn record_nodes_added(operation: &'static str, count: usize) {
    counter!(
        format!("{}_nodes_added_total", METRICS_PREFIX),
        "operation" => operation
    )
    .increment(count as u64);
}

/// Helper to record a hydration outcome
pub fn record_hydration(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_hydrations_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);
}
