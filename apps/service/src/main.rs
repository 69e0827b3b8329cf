use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use logger::RotationConfig;
use tokio::signal;
use tracing::info;

mod checking;
mod config;
mod service;
mod storage;
mod watchdog;

use crate::config::Config;
use crate::service::{Command, Service};

/// Endpoint uptime monitor: DNS, TLS, HTTP, and content checks with a
/// liveness watchdog over the host loop.
#[derive(Debug, Parser)]
#[command(name = "webwatch", version, about)]
struct Args {
    /// Path to the config file (default: $XDG_CONFIG_HOME/webwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the polling interval in seconds.
    #[arg(long)]
    interval: Option<u64>,

    /// Run one check batch and exit.
    #[arg(long)]
    once: bool,

    /// Extra endpoint URLs to monitor, on top of the config file.
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        Config::from_config(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(interval) = args.interval {
        config.timing.poll_interval_secs = interval;
    }
    for url in &args.urls {
        config.endpoints.push(crate::config::EndpointSeed {
            name: None,
            url: url.clone(),
            check_string: None,
        });
    }

    logger::init_with_file(
        config.logging.file.as_ref(),
        RotationConfig { max_bytes: config.logging.max_bytes, max_backups: config.logging.backups },
    )
    .context("failed to initialize logging")?;

    info!(endpoints = config.endpoints.len(), "webwatch starting");

    let built = Service::build(&config).await?;

    if args.once {
        // No watchdog in one-shot mode; there is no long-lived loop to probe.
        return built.service.run_once().await;
    }

    tokio::spawn(built.watchdog.run());
    let service_task =
        tokio::spawn(built.service.run(built.responder, built.commands_rx));

    signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = built.commands_tx.send(Command::Shutdown).await;
    service_task.await?;

    Ok(())
}
