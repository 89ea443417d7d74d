//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define health check metrics (probes, latency, transitions, status)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `health_probes_total` (counter): probes by cluster, protocol, outcome
//! - `health_probe_duration_seconds` (histogram): probe latency
//! - `health_status_transitions_total` (counter): transitions by cluster, from, to
//! - `health_host_status` (gauge): 1 for a host's current status, 0 otherwise
//! - `health_monitored_hosts` (gauge): hosts per cluster
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Without an installed recorder every call is a no-op
//! - Histogram buckets tuned for probe timeouts (ms to seconds)

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::health::checker::OutcomeKind;
use crate::health::host::HostId;
use crate::health::state::HealthStatus;

const PROBE_DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("health_probe_duration_seconds".to_string()),
            PROBE_DURATION_BUCKETS,
        )?
        .install()?;

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_probe(cluster: &str, protocol: &'static str, outcome: OutcomeKind, elapsed: Duration) {
    ::metrics::counter!(
        "health_probes_total",
        "cluster" => cluster.to_string(),
        "protocol" => protocol,
        "outcome" => outcome.as_str()
    )
    .increment(1);

    ::metrics::histogram!(
        "health_probe_duration_seconds",
        "cluster" => cluster.to_string(),
        "protocol" => protocol
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_transition(cluster: &str, from: HealthStatus, to: HealthStatus) {
    ::metrics::counter!(
        "health_status_transitions_total",
        "cluster" => cluster.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Mark `current` as the host's status.
pub fn record_host_status(cluster: &str, host: &HostId, current: HealthStatus) {
    for status in HealthStatus::ALL {
        let value = if status == current { 1.0 } else { 0.0 };
        ::metrics::gauge!(
            "health_host_status",
            "cluster" => cluster.to_string(),
            "host" => host.to_string(),
            "status" => status.as_str()
        )
        .set(value);
    }
}

/// Zero every status series of a host that is no longer monitored.
pub fn clear_host_status(cluster: &str, host: &HostId) {
    for status in HealthStatus::ALL {
        ::metrics::gauge!(
            "health_host_status",
            "cluster" => cluster.to_string(),
            "host" => host.to_string(),
            "status" => status.as_str()
        )
        .set(0.0);
    }
}

pub fn set_monitored_hosts(cluster: &str, count: usize) {
    ::metrics::gauge!("health_monitored_hosts", "cluster" => cluster.to_string()).set(count as f64);
}
