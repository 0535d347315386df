//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ha_store_queries_total` (counter): dispatches by trigger cause
//! - `ha_store_query_results_total` (counter): dispatch outcomes
//! - `ha_store_query_duration_seconds` (histogram): resolver latency
//! - `ha_store_cache_lookups_total` (counter): hit / miss / coalesced
//! - `ha_store_cache_tier_errors_total` (counter): remote tier failures by op
//! - `ha_store_local_records` (gauge): records held by the local tier
//! - `ha_store_circuit_state` (gauge): 1=open, 0=closed
//! - `ha_store_circuit_trips_total` (counter)
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is opt-in via `init_metrics`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_query(cause: &'static str) {
    counter!("ha_store_queries_total", "cause" => cause).increment(1);
}

pub fn record_query_result(success: bool, start: Instant) {
    let outcome = if success { "success" } else { "failure" };
    counter!("ha_store_query_results_total", "outcome" => outcome).increment(1);
    histogram!("ha_store_query_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str, count: usize) {
    if count > 0 {
        counter!("ha_store_cache_lookups_total", "result" => result).increment(count as u64);
    }
}

pub fn record_tier_error(op: &'static str) {
    counter!("ha_store_cache_tier_errors_total", "op" => op).increment(1);
}

pub fn record_local_records(count: usize) {
    gauge!("ha_store_local_records").set(count as f64);
}

pub fn record_circuit_state(open: bool) {
    gauge!("ha_store_circuit_state").set(if open { 1.0 } else { 0.0 });
    if open {
        counter!("ha_store_circuit_trips_total").increment(1);
    }
}
