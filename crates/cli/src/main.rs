//! # regionsync CLI
//!
//! Command-line entry point:
//! - configuration loading and validation
//! - offline replay through the matcher into the sinks
//! - record container inspection
//! - graceful shutdown handling

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use contracts::LogConfig;
use observability::{LogFormat, ObservabilityConfig};
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "regionsync starting");

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging from CLI flags, falling back to the `[log]` config section
fn init_logging(cli: &Cli) -> Result<()> {
    let log_config = peek_log_config(cli);

    let default_log_level = if cli.quiet {
        "warn".to_string()
    } else {
        match cli.verbose {
            0 => log_config.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let log_format = match cli.log_format {
        Some(format) => format.into(),
        None => log_config
            .format
            .parse::<LogFormat>()
            .unwrap_or(LogFormat::Compact),
    };

    observability::init_with_config(ObservabilityConfig {
        log_format,
        metrics_port: None,
        default_log_level,
    })
}

/// Best-effort read of the `[log]` section; a broken config is reported by the command itself
fn peek_log_config(cli: &Cli) -> LogConfig {
    let path = cli.config_path();
    if !path.exists() {
        return LogConfig::default();
    }
    config_loader::ConfigLoader::parse_path(path)
        .map(|config| config.log)
        .unwrap_or_default()
}
