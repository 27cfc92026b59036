//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sync_polls_total` (counter): settled polls by key and outcome
//! - `sync_cache_entries` (gauge): entries held by the request cache
//! - `sync_inflight_requests` (gauge): de-duplicated calls currently outstanding
//! - `sync_gate_requests_total` (counter): gate results (hit, joined, issued)
//! - `sync_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `sync_circuit_rejections_total` (counter): calls short-circuited by a breaker

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_poll(key: &str, outcome: &'static str) {
    counter!("sync_polls_total", "key" => key.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_cache_size(size: usize) {
    gauge!("sync_cache_entries").set(size as f64);
}

pub fn record_inflight(count: usize) {
    gauge!("sync_inflight_requests").set(count as f64);
}

pub fn record_gate_result(result: &'static str) {
    counter!("sync_gate_requests_total", "result" => result).increment(1);
}

pub fn record_circuit_state(dependency: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("sync_circuit_state", "dependency" => dependency.to_string()).set(value);
}

pub fn record_circuit_rejection(dependency: &str) {
    counter!("sync_circuit_rejections_total", "dependency" => dependency.to_string()).increment(1);
}
