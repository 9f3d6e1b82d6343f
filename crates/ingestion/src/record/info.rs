//! Record channel info

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use contracts::{MessageKind, MessageTypeTable};
use serde::Serialize;

use super::format::{ChannelDecl, RecordReader};
use crate::error::Result;

/// Semantic class of a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChannelClass {
    Kind(MessageKind),
    /// Type name missing from the table; reported, never decoded
    Unclassified(String),
}

impl fmt::Display for ChannelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelClass::Kind(kind) => write!(f, "{kind}"),
            ChannelClass::Unclassified(type_name) => write!(f, "{type_name}"),
        }
    }
}

/// Classify every declared channel: known kinds, or the raw type name
pub fn channel_match(
    channels: &[ChannelDecl],
    table: &MessageTypeTable,
) -> Vec<(String, ChannelClass)> {
    channels
        .iter()
        .map(|c| {
            let class = table
                .classify(&c.message_type)
                .map(ChannelClass::Kind)
                .unwrap_or_else(|| ChannelClass::Unclassified(c.message_type.clone()));
            (c.name.clone(), class)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub message_type: String,
    pub class: ChannelClass,
    pub count: u64,
}

/// Time range and per-channel message counts of a container
#[derive(Debug, Clone, Serialize)]
pub struct RecordInfo {
    pub path: PathBuf,
    pub start_time_ns: Option<u64>,
    pub end_time_ns: Option<u64>,
    pub message_count: u64,
    pub channels: Vec<ChannelInfo>,
}

impl RecordInfo {
    /// Scan the whole container once
    pub fn scan(path: impl AsRef<Path>, table: &MessageTypeTable) -> Result<Self> {
        let mut reader = RecordReader::open(path.as_ref())?;
        let decls = reader.channels().to_vec();

        let mut counts: HashMap<u32, u64> = HashMap::new();
        let mut start: Option<u64> = None;
        let mut end: Option<u64> = None;
        let mut total = 0u64;

        while let Some(entry) = reader.next_entry()? {
            *counts.entry(entry.channel).or_default() += 1;
            start = Some(start.map_or(entry.log_time_ns, |s| s.min(entry.log_time_ns)));
            end = Some(end.map_or(entry.log_time_ns, |e| e.max(entry.log_time_ns)));
            total += 1;
        }

        let channels = channel_match(&decls, table)
            .into_iter()
            .zip(decls)
            .enumerate()
            .map(|(i, ((name, class), decl))| ChannelInfo {
                name,
                message_type: decl.message_type,
                class,
                count: counts.get(&(i as u32)).copied().unwrap_or(0),
            })
            .collect();

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            start_time_ns: start,
            end_time_ns: end,
            message_count: total,
            channels,
        })
    }

    pub fn duration_ms(&self) -> u64 {
        match (self.start_time_ns, self.end_time_ns) {
            (Some(start), Some(end)) => (end - start) / 1_000_000,
            _ => 0,
        }
    }
}

impl fmt::Display for RecordInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Record: {}", self.path.display())?;
        match (self.start_time_ns, self.end_time_ns) {
            (Some(start), Some(end)) => {
                writeln!(f, "  Start: {} ns", start)?;
                writeln!(f, "  End:   {} ns", end)?;
                writeln!(f, "  Duration: {} ms", self.duration_ms())?;
            }
            _ => writeln!(f, "  (empty)")?,
        }
        writeln!(f, "  Messages: {}", self.message_count)?;
        writeln!(f, "  Channels:")?;
        for c in &self.channels {
            writeln!(
                f,
                "    {:<32} {:<20} {:>8}  ({})",
                c.name,
                c.class.to_string(),
                c.count,
                c.message_type
            )?;
        }
        Ok(())
    }
}
