//! quantbench CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

use quantbench::cli::{self, Cli, Commands};
use quantbench::infrastructure::config::ConfigLoader;
use quantbench::infrastructure::logging::{prune_old_logs, Logger};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(code) => code,
        Err(err) => cli::handle_error(err, json),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };

    let _logger = Logger::init(&config.logging).context("Failed to initialize logging")?;
    if let Some(dir) = &config.logging.log_dir {
        if let Err(e) = prune_old_logs(dir, config.logging.retention_days).await {
            warn!(error = %e, "log retention cleanup failed");
        }
    }

    let config = Arc::new(config);
    match cli.command {
        Commands::Harvest(args) => cli::commands::harvest::execute(args, config, cli.json).await,
        Commands::Evaluate(args) => cli::commands::evaluate::execute(args, config, cli.json).await,
        Commands::List(args) => cli::commands::list::execute(args, config, cli.json).await,
    }
}
