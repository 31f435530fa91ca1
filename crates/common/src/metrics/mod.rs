//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Newsroom metrics
pub const METRICS_PREFIX: &str = "newsroom";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Article lifecycle
    describe_counter!(
        format!("{}_article_events_total", METRICS_PREFIX),
        Unit::Count,
        "Article lifecycle events (created, updated, deleted, published, unpublished)"
    );

    // Content queries
    describe_counter!(
        format!("{}_content_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of article list and detail queries"
    );

    describe_histogram!(
        format!("{}_content_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Article query latency in seconds"
    );

    // Engagement
    describe_counter!(
        format!("{}_engagement_toggles_total", METRICS_PREFIX),
        Unit::Count,
        "Like and bookmark toggles by resulting state"
    );

    // Moderation
    describe_counter!(
        format!("{}_comments_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total comments submitted for moderation"
    );

    describe_counter!(
        format!("{}_moderation_decisions_total", METRICS_PREFIX),
        Unit::Count,
        "Comment accept/reject/delete decisions by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record an article lifecycle event
pub fn record_article_event(event: &str) {
    counter!(
        format!("{}_article_events_total", METRICS_PREFIX),
        "event" => event.to_string()
    )
    .increment(1);
}

/// Helper to record content query metrics
pub fn record_content_query(kind: &str, duration_secs: f64) {
    counter!(
        format!("{}_content_queries_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_content_query_duration_seconds", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a like/bookmark toggle
pub fn record_toggle(kind: &str, active: bool) {
    let state = if active { "added" } else { "removed" };

    counter!(
        format!("{}_engagement_toggles_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

/// Helper to record a new comment
pub fn record_comment_created(is_reply: bool) {
    counter!(
        format!("{}_comments_created_total", METRICS_PREFIX),
        "reply" => is_reply.to_string()
    )
    .increment(1);
}

/// Helper to record a moderation decision
pub fn record_moderation(action: &str, allowed: bool) {
    let outcome = if allowed { "applied" } else { "forbidden" };

    counter!(
        format!("{}_moderation_decisions_total", METRICS_PREFIX),
        "action" => action.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
