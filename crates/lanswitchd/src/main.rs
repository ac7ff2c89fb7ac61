//! lanswitchd entry point

use anyhow::Context;
use clap::Parser;
use lanswitchd::config::DEFAULT_CONFIG_PATH;
use lanswitchd::{lifecycle, logging, LanSwitchConfig, Monitor, SystemNetwork};
use nix::unistd::Uid;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// LAN interface address failover daemon
#[derive(Debug, Parser)]
#[command(name = "lanswitchd", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Append logs to this file in addition to stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter, overrides the configuration file (RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Run a single monitoring cycle, restore the primary address and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = LanSwitchConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(file) = args.log_file {
        config.logging.file = Some(file);
    }
    config
        .validate()
        .context("invalid command-line override")?;

    if args.check {
        println!(
            "{}: interface {} primary {} secondary {}",
            args.config.display(),
            config.interface.name,
            config.interface.primary,
            config.interface.secondary
        );
        return Ok(());
    }

    logging::init_logging(&config.logging.level, config.logging.file.as_deref())?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting lanswitchd");

    if !Uid::effective().is_root() {
        warn!("Not running as root; address changes will likely be refused");
    }

    let config = Arc::new(config);
    let net = Arc::new(SystemNetwork::new(config.command_timeout()));

    let cancel = CancellationToken::new();
    let signals = lifecycle::spawn_signal_listener(cancel.clone());

    let monitor = match Monitor::startup(Arc::clone(&config), net).await {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("Startup failed: {}", e);
            return Err(e.into());
        }
    };

    let result = if args.once {
        lifecycle::run_once(monitor).await
    } else {
        lifecycle::run_managed(monitor, cancel).await
    };
    signals.abort();

    result.context("lanswitchd exited with an error")
}
