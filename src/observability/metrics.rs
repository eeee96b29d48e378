//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxyd_migrations_total` (counter): bootstrap migration outcomes by `outcome`
//! - `proxyd_migrated_entries_total` (counter): upgraded v1 entries by `kind`, `result`
//! - `proxyd_asset_provisions_total` (counter): asset installs by `asset`, `result`
//! - `proxyd_refreshes_total` (counter): background refreshes by `subject`, `result`
//! - `proxyd_refresh_round_duration_seconds` (histogram): subscription round latency
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels stay low-cardinality (no addresses, no server names)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

pub fn record_migration(outcome: &'static str) {
    counter!("proxyd_migrations_total", "outcome" => outcome).increment(1);
}

pub fn record_migrated_entries(kind: &'static str, migrated: usize, skipped: usize) {
    counter!("proxyd_migrated_entries_total", "kind" => kind, "result" => "migrated")
        .increment(migrated as u64);
    counter!("proxyd_migrated_entries_total", "kind" => kind, "result" => "skipped")
        .increment(skipped as u64);
}

pub fn record_asset_provision(asset: &str, success: bool) {
    counter!(
        "proxyd_asset_provisions_total",
        "asset" => asset.to_string(),
        "result" => result_label(success)
    )
    .increment(1);
}

pub fn record_refresh(subject: &'static str, success: bool) {
    counter!(
        "proxyd_refreshes_total",
        "subject" => subject,
        "result" => result_label(success)
    )
    .increment(1);
}

pub fn record_refresh_round(start: Instant) {
    histogram!("proxyd_refresh_round_duration_seconds").record(start.elapsed().as_secs_f64());
}
