//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Logging/metrics → Registry → Admin API → Watcher
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop admin API → Stop every scheduler → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then engines, then the admin API
//! - Shutdown is bounded: each scheduler gets at most its probe timeout

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
