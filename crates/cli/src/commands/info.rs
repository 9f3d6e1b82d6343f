//! `info` command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use contracts::MessageTypeTable;
use ingestion::{ChannelClass, RecordInfo};
use tracing::{info, warn};

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let (path, table) = resolve_record(args)?;
    info!(record = %path.display(), "Scanning record container");

    let record_info = RecordInfo::scan(&path, &table)
        .with_context(|| format!("Failed to read record {}", path.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&record_info)
            .context("Failed to serialize record info")?;
        println!("{}", json);
    } else {
        print_record_info(&record_info);
    }

    Ok(())
}

/// Record path and message type table from the arguments and, when present,
/// the config file
fn resolve_record(args: &InfoArgs) -> Result<(PathBuf, MessageTypeTable)> {
    let config = if args.config.exists() {
        match config_loader::ConfigLoader::parse_path(&args.config) {
            Ok(config) => Some(config),
            Err(e) if args.record.is_some() => {
                warn!(error = %e, "Ignoring unreadable config, using built-in message types");
                None
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to load config from {}", args.config.display())
                })
            }
        }
    } else {
        None
    };

    let table = config
        .as_ref()
        .map(|c| c.message_type_table())
        .unwrap_or_default();

    let path = match (&args.record, config.and_then(|c| c.record)) {
        (Some(path), _) => path.clone(),
        (None, Some(record)) => record.path,
        (None, None) => return Err(CliError::missing_record(&args.config).into()),
    };

    Ok((path, table))
}

fn print_record_info(record_info: &RecordInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                     Record Container                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📼 {}", record_info.path.display());
    match (record_info.start_time_ns, record_info.end_time_ns) {
        (Some(start), Some(end)) => {
            println!("   ├─ Start: {} ns", start);
            println!("   ├─ End: {} ns", end);
            println!("   ├─ Duration: {} ms", record_info.duration_ms());
        }
        _ => println!("   ├─ Empty"),
    }
    println!("   └─ Messages: {}", record_info.message_count);

    println!("\n📡 Channels ({})", record_info.channels.len());
    for (i, channel) in record_info.channels.iter().enumerate() {
        let prefix = if i == record_info.channels.len() - 1 {
            "└─"
        } else {
            "├─"
        };
        let class = match &channel.class {
            ChannelClass::Kind(kind) => kind.to_string(),
            ChannelClass::Unclassified(_) => "unclassified".to_string(),
        };
        println!(
            "   {} {} [{}] {} ({} messages)",
            prefix, channel.name, class, channel.message_type, channel.count
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::{ChannelDecl, RecordWriter};

    fn write_empty_record(path: &std::path::Path) {
        let writer = RecordWriter::create(
            path,
            vec![ChannelDecl::new("/camera", MessageTypeTable::CAMERA)],
        )
        .unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_explicit_record_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("empty.rsrec");
        write_empty_record(&record);

        let args = InfoArgs {
            record: Some(record.clone()),
            config: dir.path().join("missing.toml"),
            json: true,
        };
        let (path, table) = resolve_record(&args).unwrap();
        assert_eq!(path, record);
        assert_eq!(table.len(), MessageTypeTable::default().len());
        run_info(&args).unwrap();
    }

    #[test]
    fn test_record_path_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("site.toml");
        std::fs::write(
            &config,
            "[record]\npath = \"from_config.rsrec\"\n\n[message_types]\n\"vendor.Image\" = \"camera\"\n",
        )
        .unwrap();

        let args = InfoArgs {
            record: None,
            config,
            json: false,
        };
        let (path, table) = resolve_record(&args).unwrap();
        assert_eq!(path, PathBuf::from("from_config.rsrec"));
        assert!(table.classify("vendor.Image").is_some());
    }

    #[test]
    fn test_no_record_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        let args = InfoArgs {
            record: None,
            config: dir.path().join("missing.toml"),
            json: false,
        };
        let err = resolve_record(&args).unwrap_err();
        assert!(err.to_string().contains("No record container"));
    }
}
