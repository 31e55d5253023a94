//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): requests by method, status, backend
//! - `balancer_request_duration_seconds` (histogram): end-to-end latency
//! - `balancer_escalations_total` (counter): retries, failovers and terminal 503 reasons
//! - `balancer_backend_up` (gauge): 1=reachable, 0=unreachable, per probe tick

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];
    counter!("balancer_requests_total", &labels).increment(1);
    histogram!("balancer_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_escalation(kind: &'static str) {
    counter!("balancer_escalations_total", "kind" => kind).increment(1);
}

pub fn record_backend_health(backend: &str, up: bool) {
    gauge!("balancer_backend_up", "backend" => backend.to_string()).set(if up { 1.0 } else { 0.0 });
}
