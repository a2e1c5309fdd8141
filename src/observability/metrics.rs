//! # Metrics Collection
//!
//! Issuance and ingest counters exported through Prometheus.

use std::net::SocketAddr;
use std::time::Duration;

use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Record the outcome of an issuance attempt
pub fn record_issuance(strategy: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    let labels = [("strategy", strategy.to_string()), ("outcome", outcome.to_string())];
    counter!("certforge_issuance_total", &labels).increment(1);
}

/// Record how long the signer took for one certificate
pub fn record_signing_duration(strategy: &str, duration: Duration) {
    let labels = [("strategy", strategy.to_string())];
    histogram!("certforge_signing_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record the outcome of an uploaded-certificate ingest
pub fn record_ingest(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!("certforge_ingest_total", &labels).increment(1);
}

fn describe_metrics() {
    describe_counter!(
        "certforge_issuance_total",
        "Certificate issuance attempts by strategy and outcome"
    );
    describe_counter!("certforge_ingest_total", "Uploaded certificate ingests by outcome");
    describe_histogram!(
        "certforge_signing_duration_seconds",
        Unit::Seconds,
        "Time spent generating and signing one certificate"
    );
}

/// Install the Prometheus exporter when a metrics port is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no metrics port configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    describe_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );
    Ok(())
}
