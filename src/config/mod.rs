//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → ClusterRegistry::apply
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → registry reconciles clusters
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - Admin and observability sections have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{ClusterConfig, EngineConfig, HealthCheckConfig, OverridePolicy, Payload};
pub use validation::{ValidationError, ValidationErrorKind};
