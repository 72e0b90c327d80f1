//! tmon Sensor - Answers hostname and temperature requests over TCP
//!
//! # Usage
//!
//! ```bash
//! # Run with ./temperature-monitor.toml or the user config file
//! tmon-sensor
//!
//! # Run with an explicit configuration file
//! tmon-sensor --config /etc/temperature-monitor.toml
//!
//! # Enable debug logging
//! RUST_LOG=tmon_sensor=debug tmon-sensor
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tmon_core::Config;
use tmon_sensor::{probe_from_config, SensorServer};

/// tmon sensor node - serves this host's temperature to the monitor
#[derive(Parser, Debug)]
#[command(name = "tmon-sensor", version, about)]
struct Args {
    /// Configuration file (overrides TMON_CONFIG and the default locations)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tmon_sensor=info".parse()?)
                .add_directive("tmon_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, config_path) =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let sensor = config
        .sensor()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        hostname = %sensor.hostname,
        port = sensor.port,
        "tmon sensor starting"
    );

    let cancel_token = CancellationToken::new();
    let probe = probe_from_config(sensor);
    let server = SensorServer::from_config(sensor, probe, cancel_token.clone())
        .context("Failed to start sensor server")?;

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("tmon sensor stopped");
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
