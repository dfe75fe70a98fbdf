//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_chain_requests_total` (counter): executed chains by outcome
//! - `proxy_chain_duration_seconds` (histogram): time to produce the response head
//! - `proxy_chain_aborts_total` (counter): aborted chains by failing stage
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op
//! - The Prometheus exporter is optional and serves its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(err) => tracing::error!(address = %addr, error = %err, "Failed to start metrics endpoint"),
    }
}

/// Record one finished chain execution.
pub fn record_chain(outcome: &'static str, started: Instant) {
    counter!("proxy_chain_requests_total", "outcome" => outcome).increment(1);
    histogram!("proxy_chain_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

/// Record an abort at `stage`.
pub fn record_abort(stage: &'static str) {
    counter!("proxy_chain_aborts_total", "stage" => stage).increment(1);
}
