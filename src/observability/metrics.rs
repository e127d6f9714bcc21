//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, latency, connections, rejections)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `server_requests_total` (counter): requests by method, status
//! - `server_request_duration_seconds` (histogram): handling latency
//! - `server_active_connections` (gauge): connections being processed
//! - `server_rejected_connections_total` (counter): queue-full rejections
//! - `server_decode_failures_total` (counter): requests answered with 400
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Low-overhead metric updates (atomic operations)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, started: Instant) {
    counter!(
        "server_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("server_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_decode_failure() {
    counter!("server_decode_failures_total").increment(1);
}

pub fn record_rejected() {
    counter!("server_rejected_connections_total").increment(1);
}

pub fn connection_opened() {
    gauge!("server_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("server_active_connections").decrement(1.0);
}
