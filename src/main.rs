//! Upstream health check daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ loader/validation ──▶ ClusterRegistry
//!        │                                     │ one HealthCheckEngine per cluster
//!        ▼                                     ▼
//!   ConfigWatcher ── reload ──▶ apply   ProbeScheduler per host
//!                                              │ HTTP / TCP / Redis / gRPC probe
//!                                              ▼
//!                                       HostHealthState (hysteresis)
//!                                              │
//!                      ┌───────────────────────┼─────────────────────┐
//!                      ▼                       ▼                     ▼
//!               admin API (pull)      status change events     Prometheus metrics
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use health_engine::lifecycle::startup;

#[derive(Parser)]
#[command(name = "health-engine")]
#[command(about = "Active health checking for upstream host pools", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "health-engine.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match startup::run(&cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("health-engine: {e}");
            ExitCode::FAILURE
        }
    }
}
