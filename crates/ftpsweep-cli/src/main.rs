use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ftpsweep_core::config::parse_override;
use ftpsweep_core::{EnvSource, FileSource, LayeredSource, MapSource, SweepConfig};

mod commands;

#[derive(Parser)]
#[command(name = "ftpsweep")]
#[command(author, version, about = "Deletes old files from an FTP server on a schedule")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file of KEY = value pairs [default: ~/.config/ftpsweep/config.toml]
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Override a setting, e.g. --set DRY_RUN=N (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override, global = true)]
    overrides: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep on a schedule until stopped (default)
    Run,
    /// Run a single sweep and exit
    Once,
    /// Show the effective configuration without connecting
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a .env file before anything reads the environment
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => {
            if !path.exists() {
                tracing::warn!("Config file {} does not exist", path.display());
            }
            path
        }
        None => FileSource::default_path(),
    };

    // Later layers win: file < environment < command line
    let source = LayeredSource::new()
        .layer(FileSource::new(config_path.clone()))
        .layer(EnvSource)
        .layer(cli.overrides.into_iter().collect::<MapSource>());
    let config = SweepConfig::new(source);

    match cli.command {
        Some(Commands::Run) | None => commands::run::run(config).await,
        Some(Commands::Once) => commands::once::run(config).await,
        Some(Commands::Check) => commands::check::run(&config, &config_path),
    }
}
