//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_poll_cycles_total` (counter): poll cycles by outcome
//! - `config_poll_skipped_total` (counter): ticks dropped by the reentrancy guard
//! - `config_downloads_total` (counter): section downloads by section, outcome
//! - `config_reloads_total` (counter): reloads by section, outcome
//! - `config_sections_materialized` (gauge): sections with a published value

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_poll_cycle(outcome: &'static str) {
    metrics::counter!("config_poll_cycles_total", "outcome" => outcome).increment(1);
}

pub fn record_poll_skipped() {
    metrics::counter!("config_poll_skipped_total").increment(1);
}

pub fn record_download(section: &str, outcome: &'static str) {
    metrics::counter!(
        "config_downloads_total",
        "section" => section.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_reload(section: &str, outcome: &'static str) {
    metrics::counter!(
        "config_reloads_total",
        "section" => section.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// A reload callback failed; keyed by file since the section may be unknown.
pub fn record_reload_failure(file: &str) {
    metrics::counter!(
        "config_reloads_total",
        "section" => file.to_string(),
        "outcome" => "failed"
    )
    .increment(1);
}

pub fn record_section_materialized() {
    metrics::gauge!("config_sections_materialized").increment(1.0);
}
