//! 配置解析模块
//!
//! 支持 TOML（主格式）与 JSON。

use contracts::{AppConfig, ContractError};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 根据文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<AppConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<AppConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<AppConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{MatchClock, SinkType};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[matcher]
max_time_diff_ms = 200
clock = "device"

[record]
path = "drive.rsrec"
camera_channel = "/camera"
event_channel = "/events"

[regions]
image_regions = ["lane_1", "lane_2"]

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.matcher.max_time_diff_ms, 200);
        assert_eq!(config.matcher.clock, MatchClock::Device);
        assert_eq!(config.regions.image_regions.len(), 2);
        assert_eq!(config.sinks[0].sink_type, SinkType::Log);
        assert_eq!(config.queues.events, 1000);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "record": { "path": "drive.rsrec", "fps": 10.0 },
            "message_types": { "vendor.Image": "camera" },
            "sinks": [{ "name": "out", "sink_type": "file", "params": { "base_path": "/tmp/out" } }]
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.record.as_ref().and_then(|r| r.fps), Some(10.0));
        assert_eq!(config.message_types.len(), 1);
        assert_eq!(config.sinks[0].params["base_path"], "/tmp/out");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse_toml("invalid toml [[[").unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
