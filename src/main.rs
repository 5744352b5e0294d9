//! # Skycast: periodic weather-forecast emails
//!
//! Usage:
//!   skycast serve                      # HTTP API + scheduler
//!   skycast serve --reconcile          # Repair schedule/subscription drift first
//!   skycast forecast --email a@b.c --city Kyiv
//!   skycast init-config                # Write a default config file

use anyhow::Result;
use clap::{Parser, Subcommand};
use skycast_core::SkycastConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skycast", version, about = "🌦️ Skycast: weather forecasts by email")]
struct Cli {
    /// Config file (default: ~/.skycast/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway and the forecast scheduler
    Serve {
        /// Gateway port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Re-register unscheduled subscriptions and drop orphaned entries
        #[arg(long)]
        reconcile: bool,
    },
    /// Run the forecast pipeline once in the foreground
    Forecast {
        #[arg(long)]
        email: String,
        #[arg(long)]
        city: String,
    },
    /// Write the default config file and exit
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .as_deref()
        .map(skycast_gateway::server::expand_path)
        .unwrap_or_else(SkycastConfig::default_path)
}

fn load_config(path: &Path) -> Result<SkycastConfig> {
    let mut config = if path.exists() {
        SkycastConfig::load_from(path)?
    } else {
        tracing::warn!("⚠️ No config at {}, using defaults", path.display());
        SkycastConfig::default()
    };
    config.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "skycast=debug,skycast_scheduler=debug,skycast_gateway=debug,tower_http=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let path = config_path(&cli);

    match &cli.command {
        Command::InitConfig { force } => {
            if path.exists() && !force {
                println!("⚠️  Config already exists at {} (use --force to overwrite)", path.display());
                return Ok(());
            }
            SkycastConfig::default().save_to(&path)?;
            println!("✅ Config written to {}", path.display());
        }
        Command::Forecast { email, city } => {
            let config = load_config(&path)?;
            let db = Arc::new(skycast_db::Database::open(&skycast_gateway::server::expand_path(
                &config.database.path,
            ))?);
            let api = skycast_providers::create_weather_api(&config.weather)?;
            let provider = Arc::new(skycast_providers::WeatherProvider::new(api, db.clone(), db));
            let notifier = skycast_channels::create_notifier(&config.email);
            let pipeline =
                skycast_scheduler::ForecastPipeline::new(provider, notifier).with_config(&config);

            let message = pipeline.run(email, city).await?;
            println!("✅ Forecast sent to {email}\n\n{}", message.body);
        }
        Command::Serve { port, reconcile } => {
            let mut config = load_config(&path)?;
            if let Some(port) = port {
                config.gateway.port = *port;
            }

            let state = skycast_gateway::AppState::from_config(&config)?;
            let report = state.subscriptions.reconcile(*reconcile)?;
            if !reconcile && !report.unscheduled.is_empty() {
                tracing::warn!(
                    "🧭 {} subscription(s) have no schedule entry; restart with --reconcile to repair",
                    report.unscheduled.len()
                );
            }
            tracing::info!(
                "⏰ Schedule entries loaded: {}",
                state.engine.entry_count().unwrap_or(0)
            );

            skycast_gateway::start(state).await?;
        }
    }

    Ok(())
}
