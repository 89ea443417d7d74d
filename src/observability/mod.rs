//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Schedulers, engines, admin API produce:
//!     → logging.rs (structured log events, per-host spans)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Cluster and host flow through every probe log line via spans
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
