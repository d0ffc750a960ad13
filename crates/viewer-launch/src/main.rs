//! viewer-launch - start the viewer host, or hand a deep link to the running one
//!
//! Usage:
//!   viewer-launch [LOCATOR]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use viewer_config::logging::{init_logging, LogLevel};
use viewer_config::{log_boot_info, Config};
use viewer_launch::bootstrap::{install_stop_handlers, run_headless, Bootstrap, Launch, Startup};

#[derive(Parser)]
#[command(name = "viewer-launch")]
#[command(version, about = "Viewer bootstrap with single-instance hand-off", long_about = None)]
struct Cli {
    /// Deep link to open, e.g. app://region/Ahern/128/128/30
    #[arg(value_name = "LOCATOR")]
    locator: Option<String>,

    /// Grid identifier reported on crash
    #[arg(long)]
    grid: Option<String>,

    /// Config file to use instead of the standard locations
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run independently of any other instance
    #[arg(long)]
    no_single_instance: bool,

    /// error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    if let Some(grid) = cli.grid {
        config.crash.grid_id = grid;
    }
    if cli.no_single_instance {
        config.instance.enabled = false;
    }

    let level: LogLevel = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.level)
        .parse()
        .map_err(anyhow::Error::msg)?;
    init_logging(level);
    viewer_config::replace(config.clone());

    // The headless host has no freeze watchdog to hand the reporter to.
    let Launch {
        startup,
        crash_reporter: _crash_reporter,
    } = Bootstrap::new(config, cli.locator).launch()?;
    let (queue, service) = match startup {
        Startup::Forwarded => {
            log_boot_info!("Handed off to running instance");
            return Ok(());
        }
        Startup::Primary { service, queue } => (queue, Some(service)),
        Startup::Standalone { queue } => (queue, None),
    };

    let stop = install_stop_handlers()?;
    let handled = run_headless(&queue, stop, navigate);
    log_boot_info!("Shutting down", handled = handled);

    if let Some(service) = service {
        service.shutdown();
    }
    Ok(())
}

fn navigate(request: viewer_instance::NavigationRequest) {
    log_boot_info!(
        "Navigate",
        locator = request.locator.as_str(),
        trusted = request.trusted
    );
}
