//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use config_loader::{AppConfig, ConfigLoader};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let mut config = ConfigLoader::parse_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut config, args)?;
    ConfigLoader::validate(&config).context("Invalid configuration")?;

    if config.online.is_some() {
        warn!("[online] section is ignored by `run`, replaying the record instead");
    }

    info!(
        record = ?config.record.as_ref().map(|r| r.path.display().to_string()),
        max_time_diff_ms = config.matcher.max_time_diff_ms,
        regions = config.regions.image_regions.len(),
        sinks = config.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        app: config,
        flush: args.flush,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        buffer_size: args.buffer_size.max(1),
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        matched = stats.correlations.totals.matched,
        orphan_events = stats.correlations.totals.orphan_events,
        orphan_images = stats.correlations.totals.orphan_images,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("regionsync finished");
    Ok(())
}

/// Patch the parsed config with command-line overrides
fn apply_overrides(config: &mut AppConfig, args: &RunArgs) -> Result<()> {
    if let Some(ref path) = args.record {
        info!(path = %path.display(), "Overriding record path from CLI");
        match config.record.as_mut() {
            Some(record) => record.path = path.clone(),
            None => {
                // A bare path replays nothing without channel selection
                return Err(CliError::missing_record(&args.config).into());
            }
        }
    }

    if let Some(fps) = args.fps {
        let record = config
            .record
            .as_mut()
            .ok_or_else(|| CliError::missing_record(&args.config))?;
        record.fps = if fps == 0.0 { None } else { Some(fps) };
    }

    if let Some(max_time_diff_ms) = args.max_time_diff_ms {
        info!(max_time_diff_ms, "Overriding matcher tolerance from CLI");
        config.matcher.max_time_diff_ms = max_time_diff_ms;
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &AppConfig) {
    println!("\n=== Configuration Summary ===\n");

    if let Some(ref record) = config.record {
        println!("Record:");
        println!("  Path: {}", record.path.display());
        println!("  Channels: {:?}", record.channels());
        match record.fps {
            Some(fps) => println!("  Pacing: {} fps", fps),
            None => println!("  Pacing: none"),
        }
        println!("  Event type: {}", record.event_type);
    }

    println!("\nMatcher:");
    println!("  Tolerance: {} ms", config.matcher.max_time_diff_ms);
    println!("  Queue size: {}", config.matcher.max_queue_size);
    println!("  Clock: {:?}", config.matcher.clock);
    println!("  Policy: {:?}", config.matcher.policy);

    println!("\nRegions ({}):", config.regions.image_regions.len());
    for region in &config.regions.image_regions {
        println!("  - {}", region);
    }

    if !config.sinks.is_empty() {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use contracts::RecordConfig;
    use std::path::PathBuf;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["run", "--config", "site.toml"];
        argv.extend_from_slice(extra);
        RunArgs::parse_from(argv)
    }

    fn with_record() -> AppConfig {
        AppConfig {
            record: Some(RecordConfig {
                path: "day.rsrec".into(),
                camera_channel: Some("/camera".into()),
                event_channel: Some("/events".into()),
                points_channel: None,
                box_channel: None,
                fps: Some(10.0),
                event_type: contracts::DEFAULT_EVENT_TYPE.into(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_overrides_patch_record_and_matcher() {
        let mut config = with_record();
        apply_overrides(
            &mut config,
            &args(&["--record", "night.rsrec", "--fps", "0", "--max-time-diff-ms", "40"]),
        )
        .unwrap();

        let record = config.record.unwrap();
        assert_eq!(record.path, PathBuf::from("night.rsrec"));
        assert_eq!(record.fps, None);
        assert_eq!(config.matcher.max_time_diff_ms, 40);
    }

    #[test]
    fn test_record_override_needs_record_section() {
        let mut config = AppConfig::default();
        let err = apply_overrides(&mut config, &args(&["--record", "night.rsrec"])).unwrap_err();
        assert!(err.to_string().contains("site.toml"));
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let err = run_pipeline(&args(&[])).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
