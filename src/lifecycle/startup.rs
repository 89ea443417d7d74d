//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Start one engine per cluster, then the admin API and the config watcher
//! - Apply reloaded configurations until a shutdown signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Reload only reconciles clusters; admin and observability changes need a restart

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time;

use crate::admin::{self, setup_admin_router, AdminState};
use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::EngineConfig;
use crate::config::validation::ValidationError;
use crate::config::watcher::ConfigWatcher;
use crate::health::ClusterRegistry;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};

/// How long the admin API may take to drain before it is aborted.
const ADMIN_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind admin API: {0}")]
    Bind(#[source] std::io::Error),

    #[error("invalid cluster configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run the daemon until SIGINT or SIGTERM.
pub async fn run(config_path: &Path) -> Result<(), StartupError> {
    let config = load_config(config_path)?;
    logging::init(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        path = %config_path.display(),
        clusters = config.clusters.len(),
        "health-engine starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(ClusterRegistry::new());
    registry
        .apply(&config.clusters)
        .await
        .map_err(StartupError::Validation)?;

    let shutdown = Shutdown::new();

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address)
            .await
            .map_err(StartupError::Bind)?;
        let state = AdminState {
            registry: Arc::clone(&registry),
            api_key: Arc::from(config.admin.api_key.as_str()),
        };
        let router = setup_admin_router(state, Duration::from_secs(config.admin.request_timeout_secs));
        Some(tokio::spawn(admin::serve(listener, router, shutdown.subscribe())))
    } else {
        tracing::info!("Admin API disabled");
        None
    };

    let (watcher, mut updates) = ConfigWatcher::new(config_path);
    let _watcher = match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    let signal = signals::shutdown_signal();
    tokio::pin!(signal);
    let mut current = config;

    loop {
        tokio::select! {
            _ = &mut signal => break,
            Some(next) = updates.recv() => {
                reload(&registry, &current, &next).await;
                current = next;
            }
        }
    }

    shutdown.trigger();
    if let Some(mut task) = admin_task {
        match time::timeout(ADMIN_SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Admin API failed"),
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("Admin API did not drain in time, aborting");
                task.abort();
            }
        }
    }
    registry.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn reload(registry: &ClusterRegistry, current: &EngineConfig, next: &EngineConfig) {
    if next.admin != current.admin || next.observability != current.observability {
        tracing::warn!("Admin and observability changes take effect after a restart");
    }

    match registry.apply(&next.clusters).await {
        Ok(()) => tracing::info!(clusters = next.clusters.len(), "Configuration reloaded"),
        Err(errors) => tracing::error!(
            errors = %join(&errors),
            "Rejected reloaded configuration, keeping current clusters"
        ),
    }
}
