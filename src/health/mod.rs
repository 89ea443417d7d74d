//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! ProbeScheduler (scheduler.rs), one task per host:
//!     Timer (interval + jitter)
//!     → ProtocolChecker probe (checker/), bounded by timeout
//!     → PayloadMatcher on response bytes (matcher.rs, HTTP and TCP)
//!     → Outcome into HostHealthState (state.rs)
//!     → HostSnapshot published, StatusChangeEvent emitted (event.rs)
//!
//! HealthCheckEngine (engine.rs), one per cluster:
//!     add/remove hosts, status queries, overrides, event subscription
//!
//! ClusterRegistry (registry.rs):
//!     one engine per configured cluster, reconciled on reload
//! ```
//!
//! # Design Decisions
//! - State transitions require consecutive successes/failures
//! - Health state is per-host, owned by that host's scheduler task
//! - The protocol is resolved once per cluster into a sum type

pub mod checker;
pub mod engine;
pub mod event;
pub mod host;
pub mod matcher;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod state;

pub use engine::{EngineError, HealthCheckEngine};
pub use event::StatusChangeEvent;
pub use host::HostId;
pub use registry::ClusterRegistry;
pub use scheduler::HostSnapshot;
pub use settings::HealthCheckSettings;
pub use state::{HealthStatus, Override};
