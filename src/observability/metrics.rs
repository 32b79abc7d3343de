//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hotserve_requests_total` (counter): requests by method, status
//! - `hotserve_request_duration_seconds` (histogram): latency distribution
//! - `hotserve_bundle_reloads_total` (counter): handler reloads by backend
//! - `hotserve_bundle_generation` (gauge): generation currently served
//! - `hotserve_builds_total` (counter): build attempts by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::runtime::BackendKind;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "hotserve_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("hotserve_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_reload(backend: BackendKind, generation: u64) {
    metrics::counter!("hotserve_bundle_reloads_total", "backend" => backend.to_string()).increment(1);
    metrics::gauge!("hotserve_bundle_generation").set(generation as f64);
}

pub fn record_build(outcome: &'static str) {
    metrics::counter!("hotserve_builds_total", "outcome" => outcome).increment(1);
}
