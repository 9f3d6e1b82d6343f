//! Timestamped data model
//!
//! Every item flowing through the pipeline carries a [`Timestamps`] pair and
//! implements [`Timestamped`]. Pixel and point buffers are `Bytes`, so copies
//! held by the matcher share memory with the items handed to callbacks.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::RegionName;

/// Device/local timestamp pair (milliseconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Clock of the originating sensor or message
    pub device_time_ms: u64,
    /// Wall clock at ingestion
    pub local_time_ms: u64,
}

impl Timestamps {
    pub fn new(device_time_ms: u64, local_time_ms: u64) -> Self {
        Self {
            device_time_ms,
            local_time_ms,
        }
    }

    /// Both clocks set to the same instant.
    pub fn same(time_ms: u64) -> Self {
        Self::new(time_ms, time_ms)
    }

    /// Largest gap between `self` and `other` across both clocks.
    pub fn max_gap_ms(&self, other: &Timestamps) -> u64 {
        self.device_time_ms
            .abs_diff(other.device_time_ms)
            .max(self.local_time_ms.abs_diff(other.local_time_ms))
    }
}

/// Clock selection for cross-stream comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchClock {
    /// Ingestion wall clock
    #[default]
    Local,
    /// Originating device clock
    Device,
}

/// Implemented by every item that travels through a queue.
pub trait Timestamped {
    fn timestamps(&self) -> Timestamps;

    fn time_ms(&self, clock: MatchClock) -> u64 {
        let ts = self.timestamps();
        match clock {
            MatchClock::Local => ts.local_time_ms,
            MatchClock::Device => ts.device_time_ms,
        }
    }
}

/// Oriented 3D box of a tracked object
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialBox {
    /// Center position in meters
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Extents in meters
    pub length: f32,
    pub width: f32,
    pub height: f32,
    pub object_type: u8,
    pub track_id: u32,
    pub lane_id: i32,
}

/// Decoded camera frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFrame {
    pub timestamps: Timestamps,
    /// Row-major interleaved pixels (`width * height * channels` bytes)
    pub pixels: Bytes,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Region the frame was assigned to, required by the matcher
    pub region: Option<RegionName>,
    /// Object box the frame was captured for, if any
    pub spatial_box: Option<SpatialBox>,
}

impl ImageFrame {
    /// Copy of this frame tagged with `region`. Pixel memory is shared.
    pub fn tagged(&self, region: RegionName, spatial_box: Option<SpatialBox>) -> Self {
        Self {
            region: Some(region),
            spatial_box,
            ..self.clone()
        }
    }

    /// Expected pixel buffer length from the declared geometry
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl Timestamped for ImageFrame {
    fn timestamps(&self) -> Timestamps {
        self.timestamps
    }
}

/// Point-cloud buffer layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointModel {
    /// 24-byte core / 12-byte supplement records with absolute timestamps
    #[default]
    Canonical,
    /// 15-byte core / 4-byte supplement records with relative offsets
    Packed,
}

/// Point-cloud frame with parallel `core` and `supplement` buffers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudFrame {
    pub timestamps: Timestamps,
    pub core: Bytes,
    pub supplement: Bytes,
    /// Number of points the buffers describe
    pub point_size: u32,
    pub model: PointModel,
}

impl Timestamped for PointCloudFrame {
    fn timestamps(&self) -> Timestamps {
        self.timestamps
    }
}

/// Trigger event scoped to a region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamps: Timestamps,
    pub region_name: RegionName,
    pub region_id: i32,
    pub spatial_box: Option<SpatialBox>,
    pub points: Option<PointCloudFrame>,
}

impl Timestamped for EventRecord {
    fn timestamps(&self) -> Timestamps {
        self.timestamps
    }
}

/// Events decoded from one bus/record message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub timestamps: Timestamps,
    pub events: Vec<EventRecord>,
}

impl Timestamped for EventBatch {
    fn timestamps(&self) -> Timestamps {
        self.timestamps
    }
}

/// Tracked object boxes from one message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxSet {
    pub timestamps: Timestamps,
    pub boxes: Vec<SpatialBox>,
}

impl Timestamped for BoxSet {
    fn timestamps(&self) -> Timestamps {
        self.timestamps
    }
}

/// Unit of delivery of the event side: events with optional enrichment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameBundle {
    pub timestamps: Timestamps,
    pub events: Vec<EventRecord>,
    pub points: Option<PointCloudFrame>,
    pub boxes: Option<BoxSet>,
}

impl FrameBundle {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.points.is_none() && self.boxes.is_none()
    }

    /// Events with the bundle's point cloud attached to each of them.
    pub fn into_enriched_events(self) -> Vec<EventRecord> {
        let points = self.points;
        self.events
            .into_iter()
            .map(|mut event| {
                if event.points.is_none() {
                    event.points = points.clone();
                }
                event
            })
            .collect()
    }
}

impl Timestamped for FrameBundle {
    fn timestamps(&self) -> Timestamps {
        self.timestamps
    }
}
