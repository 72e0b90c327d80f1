//! tmon Monitor - Discovers sensor nodes and polls their temperatures
//!
//! Readings go to stdout, logs to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Scan the local /24 and print readings every poll interval
//! tmon-monitor
//!
//! # One JSON object per round, e.g. for piping into jq
//! tmon-monitor --format json
//!
//! # Explicit configuration file and verbose logging
//! RUST_LOG=tmon_monitor=debug tmon-monitor --config ./lab.toml
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tmon_core::Config;
use tmon_monitor::{ConsoleReporter, DiscoveryService, PollingLoop, ReportFormat};

/// tmon monitor node - finds sensors on the local subnet and polls them
#[derive(Parser, Debug)]
#[command(name = "tmon-monitor", version, about)]
struct Args {
    /// Configuration file (overrides TMON_CONFIG and the default locations)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format for poll rounds
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One line per sensor
    Text,
    /// One JSON object per round
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tmon_monitor=info".parse()?)
                .add_directive("tmon_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, config_path) =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let monitor = config
        .monitor()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
    let discovery =
        DiscoveryService::from_config(monitor).context("Invalid [monitor] subnet setting")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        port = monitor.port,
        interval_secs = monitor.poll_interval_secs,
        "tmon monitor starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let reporter = ConsoleReporter::stdout(args.format.into());
    let mut poller = PollingLoop::new(monitor, discovery, reporter, cancel_token);
    poller.run().await;

    info!("tmon monitor stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
