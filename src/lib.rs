//! Upstream health check engine.
//!
//! Periodically probes pools of upstream hosts over HTTP, raw TCP, Redis or
//! gRPC and turns the probe outcomes into a stable, hysteresis-filtered
//! health status per host.

// Core subsystems
pub mod config;
pub mod health;

// Operator surface
pub mod admin;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::EngineConfig;
pub use health::{ClusterRegistry, HealthCheckEngine, HealthStatus, StatusChangeEvent};
pub use lifecycle::Shutdown;
