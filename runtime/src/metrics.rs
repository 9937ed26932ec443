//! Prometheus metrics for observability and monitoring.
//!
//! The runtime records two counters of its own (`store_actions_total`,
//! `store_effects_total`). Applications describe their metrics next to the
//! code that records them and call [`install_exporter`] once at startup.
//!
//! # Example
//!
//! ```rust,no_run
//! use waitlist_runtime::metrics::install_exporter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! install_exporter("0.0.0.0:9090".parse()?)?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to configure the exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install the exporter (listener bind or recorder already set)
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Histogram buckets (seconds) applied to every `*_duration_seconds` metric.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be configured or a
/// recorder is already installed.
pub fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    register_runtime_metrics();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    tracing::info!(%addr, "Metrics exporter listening at http://{addr}/metrics");
    Ok(())
}

/// Describe the counters recorded by the `Store`.
pub fn register_runtime_metrics() {
    describe_counter!(
        "store_actions_total",
        "Total number of actions reduced by stores"
    );
    describe_counter!(
        "store_effects_total",
        "Total number of effects executed, labelled by effect type"
    );
}
