//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hotvisor_reloads_total` (counter): reload attempts by `result`
//! - `hotvisor_generation` (gauge): generation of the active instance
//! - `hotvisor_watch_events_total` (counter): qualifying file events
//! - `hotvisor_watch_errors_total` (counter): notification source errors

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_reload(result: &'static str) {
    metrics::counter!("hotvisor_reloads_total", "result" => result).increment(1);
}

pub fn record_generation(generation: u64) {
    metrics::gauge!("hotvisor_generation").set(generation as f64);
}

pub fn record_watch_event() {
    metrics::counter!("hotvisor_watch_events_total").increment(1);
}

pub fn record_watch_error() {
    metrics::counter!("hotvisor_watch_errors_total").increment(1);
}
