//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): API requests by route, status
//! - `gateway_request_duration_seconds` (histogram): API latency
//! - `gateway_relay_sessions_active` (gauge): live relay sessions
//! - `gateway_relay_sessions_total` (counter): finished sessions by outcome
//! - `gateway_relay_messages_total` (counter): forwarded messages by direction
//! - `gateway_relay_dial_failures_total` (counter): failed upstream dials
//!
//! Relay metrics are recorded where they happen (`relay::registry`,
//! `relay::session`); this module installs the exporter and records API
//! request metrics.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one API request.
pub fn record_request(route: &'static str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("gateway_requests_total", "route" => route, "status" => status).increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route).record(start.elapsed().as_secs_f64());
}
