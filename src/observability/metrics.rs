//! Metrics collection and exposition.
//!
//! # Metrics
//! - `site_requests_total` (counter): requests by method and status
//! - `site_request_duration_seconds` (histogram): time spent in the
//!   application shell
//! - `site_sql_statements_total` (counter): statements by outcome
//!   (`ok`, `failed`, `prepare_failed`)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - The Prometheus exporter serves its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("site_requests_total", &labels).increment(1);
    metrics::histogram!("site_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_statement(outcome: &'static str) {
    metrics::counter!("site_sql_statements_total", "outcome" => outcome).increment(1);
}
