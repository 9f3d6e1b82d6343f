//! AppConfig - Config Loader output
//!
//! Describes the complete pipeline configuration: matcher tuning, queue
//! capacities, the online and offline source wiring, region list and sinks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::{MatchClock, MessageKind, MessageTypeTable, RegionName, DEFAULT_EVENT_TYPE};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub queues: QueueCapacities,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub adapter: AdapterConfig,

    /// Offline replay wiring
    #[serde(default)]
    pub record: Option<RecordConfig>,

    /// Live wiring
    #[serde(default)]
    pub online: Option<OnlineConfig>,

    /// Extra or overriding message type name → kind entries
    #[serde(default)]
    pub message_types: HashMap<String, MessageKind>,

    #[serde(default)]
    pub regions: RegionsConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// Built-in message type table with the configured overrides applied
    pub fn message_type_table(&self) -> MessageTypeTable {
        MessageTypeTable::with_overrides(&self.message_types)
    }
}

/// Matcher policy once a match is found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Return as soon as one pair is emitted
    #[default]
    FirstMatch,
    /// Keep evicting heads too old for the new item after the match
    DrainStale,
}

/// Matcher tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Match tolerance in milliseconds
    #[serde(default = "default_max_time_diff_ms")]
    pub max_time_diff_ms: u64,

    /// Per-region queue bound (oldest dropped on overflow)
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default)]
    pub clock: MatchClock,

    #[serde(default)]
    pub policy: MatchPolicy,
}

fn default_max_time_diff_ms() -> u64 {
    150
}

fn default_max_queue_size() -> usize {
    1000
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_time_diff_ms: default_max_time_diff_ms(),
            max_queue_size: default_max_queue_size(),
            clock: MatchClock::default(),
            policy: MatchPolicy::default(),
        }
    }
}

/// Bounded drop-oldest queue capacities per source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCapacities {
    #[serde(default = "default_camera_capacity")]
    pub camera: usize,
    #[serde(default = "default_events_capacity")]
    pub events: usize,
    #[serde(default = "default_enrichment_capacity")]
    pub point_clouds: usize,
    #[serde(default = "default_enrichment_capacity")]
    pub boxes: usize,
}

fn default_camera_capacity() -> usize {
    10
}

fn default_events_capacity() -> usize {
    1000
}

fn default_enrichment_capacity() -> usize {
    10
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            camera: default_camera_capacity(),
            events: default_events_capacity(),
            point_clouds: default_enrichment_capacity(),
            boxes: default_enrichment_capacity(),
        }
    }
}

/// Point-cloud enrichment of event batches
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Point clouds further than this from the event batch are dropped
    #[serde(default = "default_max_points_gap_ms")]
    pub max_points_gap_ms: u64,
}

fn default_max_points_gap_ms() -> u64 {
    150
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_points_gap_ms: default_max_points_gap_ms(),
        }
    }
}

/// DataAdapter worker tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Bound on joining the online worker in `stop()`
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Sleep after an online iteration that produced nothing
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_idle_backoff_ms() -> u64 {
    5
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
        }
    }
}

/// Offline replay of a record container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub camera_channel: Option<String>,

    #[serde(default)]
    pub event_channel: Option<String>,

    #[serde(default)]
    pub points_channel: Option<String>,

    #[serde(default)]
    pub box_channel: Option<String>,

    /// Camera playback rate; absent disables throttling
    #[serde(default)]
    pub fps: Option<f64>,

    #[serde(default = "default_event_type")]
    pub event_type: String,
}

impl RecordConfig {
    /// Configured channel names, in camera/event/points/box order
    pub fn channels(&self) -> Vec<String> {
        [
            &self.camera_channel,
            &self.event_channel,
            &self.points_channel,
            &self.box_channel,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

/// Live capture and bus subscriptions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineConfig {
    /// Capture URL or device of the camera
    #[serde(default)]
    pub camera_url: Option<String>,

    #[serde(default)]
    pub event_channel: Option<String>,

    #[serde(default)]
    pub points_channel: Option<String>,

    #[serde(default)]
    pub box_channel: Option<String>,

    #[serde(default = "default_event_type")]
    pub event_type: String,

    /// Pause after a failed grab
    #[serde(default = "default_capture_retry_ms")]
    pub capture_retry_ms: u64,
}

fn default_event_type() -> String {
    DEFAULT_EVENT_TYPE.to_string()
}

fn default_capture_retry_ms() -> u64 {
    100
}

/// Regions camera frames are fanned out to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionsConfig {
    #[serde(default)]
    pub image_regions: Vec<RegionName>,
}

/// Logging defaults; `RUST_LOG` and CLI flags take precedence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json`, `pretty` or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSON-lines rows plus image/point-cloud files
    File,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.matcher.max_time_diff_ms, 150);
        assert_eq!(config.matcher.max_queue_size, 1000);
        assert_eq!(config.matcher.policy, MatchPolicy::FirstMatch);
        assert_eq!(config.queues.camera, 10);
        assert_eq!(config.queues.events, 1000);
        assert_eq!(config.queues.point_clouds, 10);
        assert_eq!(config.enrichment.max_points_gap_ms, 150);
        assert_eq!(config.adapter.shutdown_timeout_ms, 5000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "matcher": { "max_time_diff_ms": 5000, "policy": "drain_stale" },
            "record": { "path": "run.rsrec", "camera_channel": "/cam", "fps": 10.0 },
            "message_types": { "apollo.drivers.Image": "camera" }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.matcher.max_time_diff_ms, 5000);
        assert_eq!(config.matcher.max_queue_size, 1000);
        assert_eq!(config.matcher.policy, MatchPolicy::DrainStale);

        let record = config.record.as_ref().unwrap();
        assert_eq!(record.event_type, DEFAULT_EVENT_TYPE);
        assert_eq!(record.channels(), vec!["/cam".to_string()]);

        let table = config.message_type_table();
        assert_eq!(table.classify("apollo.drivers.Image"), Some(MessageKind::Camera));
        assert_eq!(table.len(), 6);
    }
}
