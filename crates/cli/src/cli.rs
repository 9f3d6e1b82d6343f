//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// regionsync - correlate trigger events with camera frames per region
#[derive(Parser, Debug)]
#[command(
    name = "regionsync",
    author,
    version,
    about = "Region-keyed event/image correlation pipeline",
    long_about = "Correlates trigger events with camera frames per region.\n\n\
                  Replays a record container through the matcher, pairs events \n\
                  and images within a time tolerance, and dispatches matched \n\
                  pairs and orphans to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "REGIONSYNC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (defaults to the `[log]` section of the config)
    #[arg(long, value_enum, global = true, env = "REGIONSYNC_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Config file the selected command reads, if any
    pub fn config_path(&self) -> &Path {
        match &self.command {
            Commands::Run(args) => &args.config,
            Commands::Validate(args) => &args.config,
            Commands::Info(args) => &args.config,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a record container through the matcher into the sinks
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display record container information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "REGIONSYNC_CONFIG")]
    pub config: PathBuf,

    /// Override the record container path from configuration
    #[arg(long, env = "REGIONSYNC_RECORD")]
    pub record: Option<PathBuf>,

    /// Override replay pacing (frames per second, 0 = as fast as possible)
    #[arg(long)]
    pub fps: Option<f64>,

    /// Override the matcher tolerance in milliseconds
    #[arg(long)]
    pub max_time_diff_ms: Option<u64>,

    /// Emit everything still pending as orphans when the replay ends
    #[arg(long)]
    pub flush: bool,

    /// Pipeline timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "REGIONSYNC_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Capacity of the matcher-to-dispatcher channel
    #[arg(long, default_value = "1024", env = "REGIONSYNC_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "REGIONSYNC_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Record container to inspect (defaults to `record.path` of the config)
    pub record: Option<PathBuf>,

    /// Configuration providing the record path and message type overrides
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
