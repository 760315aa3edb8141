//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define stub server metrics (requests, latency, precondition failures)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `stub_requests_total` (counter): requests by method, status, outcome
//! - `stub_request_duration_seconds` (histogram): end-to-end latency
//! - `stub_pipeline_duration_seconds` (histogram): pipeline time by match kind
//! - `stub_precondition_failures_total` (counter): failures by kind (header, cookie)
//! - `stub_service_fetches_total` (counter): service calls by outcome (ok, error)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels stay low-cardinality: no paths, no request IDs, and extension
//!   methods collapse into `other`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Installs the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Label for a request method. Anything outside the standard verbs is `other`.
pub fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        "CONNECT" => "CONNECT",
        "TRACE" => "TRACE",
        _ => "other",
    }
}

/// Records one served request.
pub fn record_request(method: &str, status: u16, outcome: &str, start: Instant) {
    counter!(
        "stub_requests_total",
        "method" => method_label(method),
        "status" => status.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("stub_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Records time spent inside a pipeline.
pub fn record_pipeline(kind: &str, start: Instant) {
    histogram!("stub_pipeline_duration_seconds", "kind" => kind.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_precondition_failure(kind: &str) {
    counter!("stub_precondition_failures_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_service_fetch(outcome: &str) {
    counter!("stub_service_fetches_total", "outcome" => outcome.to_string()).increment(1);
}
