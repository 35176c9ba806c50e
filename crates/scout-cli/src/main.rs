//! Scout CLI - resolve live-event pages to stream identifiers
//!
//! Usage:
//!   scout                       Run with defaults (and ./scout.toml if present)
//!   scout --config <file>       Run with an explicit config file
//!   scout --state <file>        Override the state file location
//!   scout --headful -v          Show the browser, log at debug level

use anyhow::{Context, Result};
use clap::Parser;
use scout_browser::{BrowserConfig, ChromeLauncher};
use scout_core::ScoutConfig;
use scout_orchestrator::{HarvestSettings, Harvester, HttpListingSource};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "scout")]
#[command(author, version, about = "Resolve live-event pages to stream identifiers")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to ./scout.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// State file holding the event -> stream mapping
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;
    let settings = HarvestSettings::from_config(&config).context("Invalid configuration")?;

    let source = HttpListingSource::new(settings.site_root.as_str());
    let launcher = ChromeLauncher::new(BrowserConfig::from_settings(&config.browser));
    let harvester = Harvester::new(settings, source, launcher);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, saving collected results (Ctrl-C again to quit now)");
            tokio::spawn(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        } else {
            std::future::pending::<()>().await;
        }
    };

    let report = harvester
        .run_until(shutdown)
        .await
        .context("Failed to save stream records")?;

    info!("{}", report.summary);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ScoutConfig> {
    let mut config = match &cli.config {
        Some(path) => ScoutConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            ScoutConfig::load_or_default(&cwd).context("Failed to load scout.toml")?
        }
    };

    if let Some(state) = &cli.state {
        config.harvest.state_file = state.clone();
    }
    if cli.headful {
        config.browser.headless = false;
    }

    Ok(config)
}
