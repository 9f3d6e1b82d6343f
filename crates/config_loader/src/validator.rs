//! 配置校验模块
//!
//! 校验规则：
//! - matcher 容差与队列上限 > 0
//! - 所有队列容量 > 0
//! - record：路径非空；设置 fps 时必须为有限正数
//! - online：至少配置相机或事件通道；点云/框通道依赖事件通道
//! - 区域名非空且唯一
//! - sink 名非空且唯一，队列容量 > 0
//! - 日志格式合法

use std::collections::HashSet;

use contracts::{AppConfig, ContractError};

/// 校验 `config`，返回发现的第一个错误
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    validate_matcher(config)?;
    validate_queues(config)?;
    validate_record(config)?;
    validate_online(config)?;
    validate_regions(config)?;
    validate_sinks(config)?;
    validate_log(config)?;
    Ok(())
}

fn positive(field: &str, value: u64) -> Result<(), ContractError> {
    if value == 0 {
        return Err(ContractError::config_validation(field, "must be > 0"));
    }
    Ok(())
}

fn validate_matcher(config: &AppConfig) -> Result<(), ContractError> {
    positive("matcher.max_time_diff_ms", config.matcher.max_time_diff_ms)?;
    positive("matcher.max_queue_size", config.matcher.max_queue_size as u64)?;
    positive(
        "enrichment.max_points_gap_ms",
        config.enrichment.max_points_gap_ms,
    )?;
    positive("adapter.shutdown_timeout_ms", config.adapter.shutdown_timeout_ms)
}

fn validate_queues(config: &AppConfig) -> Result<(), ContractError> {
    let queues = &config.queues;
    for (field, value) in [
        ("queues.camera", queues.camera),
        ("queues.events", queues.events),
        ("queues.point_clouds", queues.point_clouds),
        ("queues.boxes", queues.boxes),
    ] {
        positive(field, value as u64)?;
    }
    Ok(())
}

fn validate_record(config: &AppConfig) -> Result<(), ContractError> {
    let Some(record) = &config.record else {
        return Ok(());
    };

    if record.path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "record.path",
            "record path cannot be empty",
        ));
    }
    if let Some(fps) = record.fps {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ContractError::config_validation(
                "record.fps",
                format!("fps must be > 0, got {fps}"),
            ));
        }
    }
    if record.event_type.trim().is_empty() {
        return Err(ContractError::config_validation(
            "record.event_type",
            "event type cannot be empty",
        ));
    }
    Ok(())
}

fn validate_online(config: &AppConfig) -> Result<(), ContractError> {
    let Some(online) = &config.online else {
        return Ok(());
    };

    if online.camera_url.is_none() && online.event_channel.is_none() {
        return Err(ContractError::config_validation(
            "online",
            "at least one of camera_url or event_channel is required",
        ));
    }
    if online.event_channel.is_none()
        && (online.points_channel.is_some() || online.box_channel.is_some())
    {
        return Err(ContractError::config_validation(
            "online.event_channel",
            "points_channel and box_channel require an event_channel",
        ));
    }
    positive("online.capture_retry_ms", online.capture_retry_ms)
}

fn validate_regions(config: &AppConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, region) in config.regions.image_regions.iter().enumerate() {
        if region.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("regions.image_regions[{idx}]"),
                "region name cannot be empty",
            ));
        }
        if !seen.insert(region.as_str()) {
            return Err(ContractError::config_validation(
                format!("regions.image_regions[{idx}]"),
                format!("duplicate region '{region}'"),
            ));
        }
    }
    Ok(())
}

fn validate_sinks(config: &AppConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        positive(&format!("sinks[{idx}].queue_capacity"), sink.queue_capacity as u64)?;
    }
    Ok(())
}

fn validate_log(config: &AppConfig) -> Result<(), ContractError> {
    match config.log.format.to_ascii_lowercase().as_str() {
        "json" | "pretty" | "compact" => Ok(()),
        other => Err(ContractError::config_validation(
            "log.format",
            format!("unknown log format '{other}' (expected json, pretty or compact)"),
        )),
    }
}
