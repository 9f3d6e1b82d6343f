//! FileSink - persists correlations under a results directory
//!
//! Layout:
//! - `results.jsonl`: one JSON row per correlation
//! - `images/{region}_{time}_{seq}.png`: the camera frame, when present
//! - `points/{region}_{time}_{seq}.ply`: the event's point cloud, when present

use chrono::{DateTime, Utc};
use contracts::{ContractError, Correlation, CorrelationSink, ImageFrame, PointCloudFrame};
use point_codec::PointRecordCodec;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument, warn};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub base_path: PathBuf,
    pub save_images: bool,
    pub save_points: bool,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./results"),
            save_images: true,
            save_points: true,
        }
    }
}

impl FileSinkConfig {
    /// Read `base_path`, `save_images` and `save_points` from sink params
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            params
                .get(key)
                .map(|v| matches!(v.trim(), "true" | "1" | "yes"))
                .unwrap_or(default)
        };

        Self {
            base_path: params
                .get("base_path")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_path),
            save_images: flag("save_images", defaults.save_images),
            save_points: flag("save_points", defaults.save_points),
        }
    }
}

#[derive(Serialize)]
struct ResultRow<'a> {
    seq: u64,
    exported_at: String,
    kind: &'static str,
    region: &'a str,
    region_id: Option<i32>,
    event_device_time_ms: Option<u64>,
    event_local_time_ms: Option<u64>,
    image_device_time_ms: Option<u64>,
    image_local_time_ms: Option<u64>,
    gap_ms: Option<u64>,
    track_id: Option<u32>,
    object_type: Option<u8>,
    image_path: Option<String>,
    points_path: Option<String>,
    point_count: Option<usize>,
}

/// Sink writing result rows, images and point clouds to disk
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    results: BufWriter<File>,
    seq: u64,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;
        if config.save_images {
            fs::create_dir_all(config.base_path.join("images"))?;
        }
        if config.save_points {
            fs::create_dir_all(config.base_path.join("points"))?;
        }
        let results = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.base_path.join("results.jsonl"))?;

        Ok(Self {
            name: name.into(),
            config,
            results: BufWriter::new(results),
            seq: 0,
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    fn write_correlation(&mut self, correlation: &Correlation) -> std::io::Result<()> {
        let seq = self.seq;
        let event = correlation.event.as_ref();
        let image = correlation.image.as_ref();
        let stem = format!(
            "{}_{}_{}",
            correlation.region.path_safe(),
            time_label(correlation.timestamps().local_time_ms),
            seq
        );

        let image_path = match image {
            Some(image) if self.config.save_images => {
                let path = self.config.base_path.join("images").join(format!("{stem}.png"));
                save_image(&path, image)?.then(|| path.display().to_string())
            }
            _ => None,
        };

        let points = event.and_then(|e| e.points.as_ref());
        let (points_path, point_count) = match points {
            Some(points) if self.config.save_points => {
                let path = self.config.base_path.join("points").join(format!("{stem}.ply"));
                let count = save_point_cloud(&path, points)?;
                (Some(path.display().to_string()), Some(count))
            }
            _ => (None, None),
        };

        let spatial_box = event
            .and_then(|e| e.spatial_box)
            .or_else(|| image.and_then(|i| i.spatial_box));
        let row = ResultRow {
            seq,
            exported_at: Utc::now().to_rfc3339(),
            kind: correlation.kind().as_str(),
            region: correlation.region.as_str(),
            region_id: event.map(|e| e.region_id),
            event_device_time_ms: event.map(|e| e.timestamps.device_time_ms),
            event_local_time_ms: event.map(|e| e.timestamps.local_time_ms),
            image_device_time_ms: image.map(|i| i.timestamps.device_time_ms),
            image_local_time_ms: image.map(|i| i.timestamps.local_time_ms),
            gap_ms: correlation.gap_ms(),
            track_id: spatial_box.map(|b| b.track_id),
            object_type: spatial_box.map(|b| b.object_type),
            image_path,
            points_path,
            point_count,
        };

        serde_json::to_writer(&mut self.results, &row)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.results.write_all(b"\n")?;
        self.seq += 1;
        Ok(())
    }
}

/// Save `image` as PNG; returns false when its buffer cannot be interpreted
fn save_image(path: &Path, image: &ImageFrame) -> std::io::Result<bool> {
    let color = match image.channels {
        1 => image::ColorType::L8,
        3 => image::ColorType::Rgb8,
        4 => image::ColorType::Rgba8,
        other => {
            warn!(channels = other, "Unsupported channel count, image not saved");
            return Ok(false);
        }
    };
    if image.pixels.len() != image.expected_len() || image.pixels.is_empty() {
        warn!(
            bytes = image.pixels.len(),
            expected = image.expected_len(),
            "Image buffer does not match its geometry, image not saved"
        );
        return Ok(false);
    }

    image::save_buffer(path, &image.pixels, image.width, image.height, color)
        .map_err(std::io::Error::other)?;
    Ok(true)
}

/// Write the decoded points as binary little-endian PLY
fn save_point_cloud(path: &Path, frame: &PointCloudFrame) -> std::io::Result<usize> {
    let points = PointRecordCodec::decode_points(frame);
    let mut file = BufWriter::new(File::create(path)?);

    writeln!(file, "ply")?;
    writeln!(file, "format binary_little_endian 1.0")?;
    writeln!(file, "element vertex {}", points.len())?;
    writeln!(file, "property float x")?;
    writeln!(file, "property float y")?;
    writeln!(file, "property float z")?;
    writeln!(file, "property ushort intensity")?;
    writeln!(file, "end_header")?;

    for point in &points {
        let core = &point.core;
        file.write_all(&core.x.to_le_bytes())?;
        file.write_all(&core.y.to_le_bytes())?;
        file.write_all(&core.z.to_le_bytes())?;
        file.write_all(&core.intensity.to_le_bytes())?;
    }
    file.flush()?;
    Ok(points.len())
}

fn time_label(time_ms: u64) -> String {
    i64::try_from(time_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y%m%d_%H%M%S_%3f").to_string())
        .unwrap_or_else(|| time_ms.to_string())
}

impl CorrelationSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, correlation),
        fields(sink = %self.name, region = %correlation.region, seq = self.seq)
    )]
    async fn write(&mut self, correlation: &Correlation) -> Result<(), ContractError> {
        self.write_correlation(correlation).map_err(|e| {
            error!(sink = %self.name, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.results
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        debug!(sink = %self.name, rows = self.seq, "FileSink closed");
        Ok(())
    }
}
