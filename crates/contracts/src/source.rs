//! Source-side collaborator interfaces
//!
//! Decouples the sources from concrete transports and capture devices: the
//! messaging runtime implements [`MessageBus`], a capture backend implements
//! [`FrameGrabber`], the trigger/lane geometry implements [`RegionTagger`].

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::{
    BusMessage, ContractError, FrameBundle, ImageFrame, MessageKind, RegionName, SpatialBox,
};

/// Bus subscription callback, invoked on a transport-owned thread
pub type BusCallback = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Camera frame callback
pub type ImageCallback = Arc<dyn Fn(ImageFrame) + Send + Sync>;

/// Event-side callback (events, point clouds, boxes)
pub type FrameCallback = Arc<dyn Fn(FrameBundle) + Send + Sync>;

/// Handle returned by [`MessageBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Publish/subscribe transport
///
/// Messages are delivered already decoded. Implementations may invoke
/// callbacks on any thread, concurrently for different channels.
pub trait MessageBus: Send + Sync {
    /// Subscribe `callback` to `channel`, declaring the expected message kind.
    ///
    /// # Errors
    /// `ChannelUnavailable` when the transport cannot serve the channel
    fn subscribe(
        &self,
        channel: &str,
        kind: MessageKind,
        callback: BusCallback,
    ) -> Result<SubscriptionId, ContractError>;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Tear down the transport, dropping all subscriptions
    fn shutdown(&self);
}

/// Frame as produced by a capture backend
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Device timestamp, when the backend provides one
    pub device_time_ms: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Bytes,
}

/// Camera capture backend
///
/// Owned by exactly one capture thread; `release` is called on every exit
/// path of that thread.
pub trait FrameGrabber: Send {
    /// Capture URL or device name (used for logging)
    fn name(&self) -> &str;

    /// # Errors
    /// `ChannelUnavailable` when the device cannot be opened
    fn open(&mut self) -> Result<(), ContractError>;

    /// Grab the next frame. `Ok(None)` means no frame was ready.
    fn grab(&mut self) -> Result<Option<RawFrame>, ContractError>;

    fn release(&mut self);
}

/// Assigns camera frames to regions (trigger lines, lane polygons)
pub trait RegionTagger: Send + Sync {
    /// Regions `frame` belongs to, each with the object box that triggered it
    fn regions(&self, frame: &ImageFrame) -> Vec<(RegionName, Option<SpatialBox>)>;
}

/// Source variant, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Camera,
    ChannelEvent,
    Record,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Camera => "camera",
            SourceKind::ChannelEvent => "channel_event",
            SourceKind::Record => "record",
        };
        f.write_str(name)
    }
}

/// Pull side shared by the live sources
///
/// Camera sources return the freshest item and discard anything staler;
/// event sources return the oldest unconsumed item.
pub trait PullSource: Send + Sync {
    type Item;

    fn kind(&self) -> SourceKind;

    /// Non-blocking. `None` when nothing is available or after release.
    fn get(&self) -> Option<Self::Item>;

    /// Stop background activity and free handles. Idempotent.
    fn release(&self);

    fn is_released(&self) -> bool;
}
