//! Metrics collection and exposition.
//!
//! # Metrics
//! - `agent_api_calls_total` (counter): calls by type and status code
//! - `agent_api_call_duration_seconds` (histogram): per-call latency
//! - `agent_active_sessions` (gauge): open attach/session streams

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exposition endpoint.
pub fn init_metrics(address: SocketAddr) {
    match PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
    {
        Ok(()) => tracing::info!(address = %address, "Metrics endpoint started"),
        Err(error) => tracing::error!(error = %error, "Failed to start metrics endpoint"),
    }
}

/// Record one completed API call.
pub fn record_call(call: &'static str, status: u16, start: Instant) {
    counter!(
        "agent_api_calls_total",
        "call" => call,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("agent_api_call_duration_seconds", "call" => call)
        .record(start.elapsed().as_secs_f64());
}

pub fn session_opened() {
    gauge!("agent_active_sessions").increment(1.0);
}

pub fn session_closed() {
    gauge!("agent_active_sessions").decrement(1.0);
}
