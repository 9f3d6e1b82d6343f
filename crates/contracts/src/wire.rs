//! Wire messages
//!
//! Already-decoded structured messages as delivered by the message bus and
//! stored in record containers, plus the table classifying declared message
//! type names into semantic kinds.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::{PointModel, SpatialBox};

/// Region attribute of the default event type consumed by the pipeline
pub const DEFAULT_EVENT_TYPE: &str = "FlowEvent";

/// Raw camera frame message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraMessage {
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Bytes,
}

/// One region event inside a [`BaseEventsMessage`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseEvent {
    /// Event attribute, e.g. `FlowEvent`
    pub region_attribute: String,
    pub region_name: String,
    pub region_id: i32,
    #[serde(default)]
    pub boxes: Vec<SpatialBox>,
}

/// Batch of region events produced at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseEventsMessage {
    pub timestamp_ms: u64,
    pub events: Vec<BaseEvent>,
}

/// Uncompressed point-cloud message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudMessage {
    pub timestamp_ms: u64,
    /// Absolute start of the sweep, base for packed per-point offsets
    pub frame_start_ns: u64,
    pub model: PointModel,
    pub point_size: u32,
    pub core: Bytes,
    pub supplement: Bytes,
}

/// LZ4 block-compressed [`PointCloudMessage`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedPointCloudMessage {
    pub timestamp_ms: u64,
    pub uncompressed_size: u32,
    pub data: Bytes,
}

/// Tracked object boxes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxesMessage {
    pub timestamp_ms: u64,
    pub boxes: Vec<SpatialBox>,
}

/// Any message the bus or a record container can carry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusMessage {
    Camera(CameraMessage),
    Events(BaseEventsMessage),
    Boxes(BoxesMessage),
    PointCloud(PointCloudMessage),
    CompressedPointCloud(CompressedPointCloudMessage),
}

impl BusMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            BusMessage::Camera(_) => MessageKind::Camera,
            BusMessage::Events(_) => MessageKind::Event,
            BusMessage::Boxes(_) => MessageKind::Box,
            BusMessage::PointCloud(_) => MessageKind::Points,
            BusMessage::CompressedPointCloud(_) => MessageKind::CompressedPoints,
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        match self {
            BusMessage::Camera(m) => m.timestamp_ms,
            BusMessage::Events(m) => m.timestamp_ms,
            BusMessage::Boxes(m) => m.timestamp_ms,
            BusMessage::PointCloud(m) => m.timestamp_ms,
            BusMessage::CompressedPointCloud(m) => m.timestamp_ms,
        }
    }
}

/// Semantic kind of a channel's messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Camera,
    Event,
    Box,
    Points,
    CompressedPoints,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Camera => "camera",
            MessageKind::Event => "event",
            MessageKind::Box => "box",
            MessageKind::Points => "points",
            MessageKind::CompressedPoints => "compressed_points",
        }
    }

    /// Both point-cloud kinds land in the same queue.
    pub fn is_points(&self) -> bool {
        matches!(self, MessageKind::Points | MessageKind::CompressedPoints)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps declared message type names to [`MessageKind`]s.
///
/// Types missing from the table pass through unclassified: they are listed in
/// channel info but never decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTypeTable {
    entries: HashMap<String, MessageKind>,
}

impl MessageTypeTable {
    pub const CAMERA: &'static str = "regionsync.CameraFrame";
    pub const EVENTS: &'static str = "regionsync.BaseEvents";
    pub const BOXES: &'static str = "regionsync.Boxes";
    pub const POINT_CLOUD: &'static str = "regionsync.PointCloud";
    pub const COMPRESSED_POINT_CLOUD: &'static str = "regionsync.CompressedPointCloud";

    /// Table with no entries
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Built-in table, extended or overridden by `overrides`
    pub fn with_overrides(overrides: &HashMap<String, MessageKind>) -> Self {
        let mut table = Self::default();
        for (name, kind) in overrides {
            table.insert(name.clone(), *kind);
        }
        table
    }

    pub fn insert(&mut self, type_name: impl Into<String>, kind: MessageKind) {
        self.entries.insert(type_name.into(), kind);
    }

    pub fn classify(&self, type_name: &str) -> Option<MessageKind> {
        self.entries.get(type_name).copied()
    }

    /// Canonical type name used when writing `kind` messages
    pub fn type_name_of(kind: MessageKind) -> &'static str {
        match kind {
            MessageKind::Camera => Self::CAMERA,
            MessageKind::Event => Self::EVENTS,
            MessageKind::Box => Self::BOXES,
            MessageKind::Points => Self::POINT_CLOUD,
            MessageKind::CompressedPoints => Self::COMPRESSED_POINT_CLOUD,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MessageTypeTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for kind in [
            MessageKind::Camera,
            MessageKind::Event,
            MessageKind::Box,
            MessageKind::Points,
            MessageKind::CompressedPoints,
        ] {
            table.insert(Self::type_name_of(kind), kind);
        }
        table
    }
}
