//! Wire message conversion
//!
//! Turns already-decoded bus/record messages into the timestamped data model.
//! Device time comes from the message, local time from the caller (receipt
//! wall clock online, recording log time offline).

use contracts::{
    BaseEventsMessage, BoxSet, BoxesMessage, BusMessage, CameraMessage, EventBatch, EventRecord,
    ImageFrame, PointCloudFrame, Timestamps,
};
use point_codec::{CodecError, PointRecordCodec};
use tracing::{trace, warn};

/// Camera message to an untagged image frame
pub fn image_from_camera(msg: CameraMessage, local_time_ms: u64) -> ImageFrame {
    let frame = ImageFrame {
        timestamps: Timestamps::new(msg.timestamp_ms, local_time_ms),
        pixels: msg.data,
        width: msg.width,
        height: msg.height,
        channels: msg.channels,
        region: None,
        spatial_box: None,
    };
    if frame.pixels.len() != frame.expected_len() {
        warn!(
            width = frame.width,
            height = frame.height,
            channels = frame.channels,
            bytes = frame.pixels.len(),
            "Camera frame size does not match its geometry"
        );
    }
    frame
}

/// Events of `event_type`, each carrying the first box of its base event
pub fn events_from_message(
    msg: &BaseEventsMessage,
    event_type: &str,
    local_time_ms: u64,
) -> EventBatch {
    let timestamps = Timestamps::new(msg.timestamp_ms, local_time_ms);
    let events = msg
        .events
        .iter()
        .filter(|base| {
            let keep = base.region_attribute == event_type;
            if !keep {
                trace!(
                    region = %base.region_name,
                    attribute = %base.region_attribute,
                    "Skipping event of another type"
                );
            }
            keep
        })
        .map(|base| EventRecord {
            timestamps,
            region_name: base.region_name.as_str().into(),
            region_id: base.region_id,
            spatial_box: base.boxes.first().copied(),
            points: None,
        })
        .collect();

    EventBatch { timestamps, events }
}

pub fn boxes_from_message(msg: BoxesMessage, local_time_ms: u64) -> BoxSet {
    BoxSet {
        timestamps: Timestamps::new(msg.timestamp_ms, local_time_ms),
        boxes: msg.boxes,
    }
}

/// Canonical point cloud from either point-cloud message kind.
///
/// Returns `None` for messages that are not point clouds.
pub fn points_from_message(
    msg: BusMessage,
    local_time_ms: u64,
) -> Option<Result<PointCloudFrame, CodecError>> {
    match msg {
        BusMessage::PointCloud(msg) => Some(Ok(PointRecordCodec::frame_from_message(
            msg,
            local_time_ms,
        ))),
        BusMessage::CompressedPointCloud(msg) => {
            Some(PointRecordCodec::transcode_packed(&msg, local_time_ms))
        }
        _ => None,
    }
}
