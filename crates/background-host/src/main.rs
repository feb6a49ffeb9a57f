//! DocBridge background host: GitHub App connect flow and authenticated
//! request relay, spoken over JSON lines on stdio.

mod app;
mod protocol;
mod router;
mod tabs;

use std::path::PathBuf;

use bridge_config_and_utils::{init_logging, Config, Paths};
use clap::{Parser, ValueEnum};
use github_connect::HostEvent;
use tracing::error;

/// DocBridge background host command-line interface.
#[derive(Parser)]
#[command(name = "docbridge-host")]
#[command(about = "DocBridge background host for GitHub connect and request relay")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Base directory for state, logs and config. Defaults to ~/.docbridge
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Lifecycle event that started the host
    #[arg(long, value_enum, default_value_t = LaunchEvent::Startup)]
    event: LaunchEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LaunchEvent {
    Startup,
    Installed,
}

impl From<LaunchEvent> for HostEvent {
    fn from(event: LaunchEvent) -> Self {
        match event {
            LaunchEvent::Startup => HostEvent::Startup,
            LaunchEvent::Installed => HostEvent::Installed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_logging(&config.log_level, &paths);

    let result = app::run_host(config, paths, cli.event.into()).await;
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Background host failed");
        eprintln!("docbridge-host: {e:#}");
    }

    // The blocking stdin reader cannot be cancelled; do not wait for it.
    std::process::exit(if result.is_ok() { 0 } else { 1 });
}
