//! ChannelEventSource - push-driven event source with pull access
//!
//! Bus callbacks push decoded events, point clouds and box sets into their own
//! drop-oldest queues; consumers pull the oldest event batch enriched with
//! the next point cloud and box set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use contracts::{
    BoxSet, BusMessage, ContractError, EnrichmentConfig, EventBatch, FrameBundle, MessageBus,
    MessageKind, OnlineConfig, PointCloudFrame, PullSource, QueueCapacities, SourceKind,
    SubscriptionId, Timestamped, DEFAULT_EVENT_TYPE,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::convert;
use crate::queue::BoundedDropQueue;
use crate::worker::wall_clock_ms;

/// Channel wiring and queue sizing
#[derive(Debug, Clone)]
pub struct ChannelEventOptions {
    /// Required
    pub event_channel: Option<String>,
    pub points_channel: Option<String>,
    pub box_channel: Option<String>,
    /// Region attribute of the events to keep
    pub event_type: String,
    pub capacities: QueueCapacities,
    /// Point clouds further than this from the event batch are dropped
    pub max_points_gap_ms: u64,
}

impl Default for ChannelEventOptions {
    fn default() -> Self {
        Self {
            event_channel: None,
            points_channel: None,
            box_channel: None,
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            capacities: QueueCapacities::default(),
            max_points_gap_ms: EnrichmentConfig::default().max_points_gap_ms,
        }
    }
}

impl ChannelEventOptions {
    pub fn from_config(
        online: &OnlineConfig,
        capacities: QueueCapacities,
        enrichment: EnrichmentConfig,
    ) -> Self {
        Self {
            event_channel: online.event_channel.clone(),
            points_channel: online.points_channel.clone(),
            box_channel: online.box_channel.clone(),
            event_type: online.event_type.clone(),
            capacities,
            max_points_gap_ms: enrichment.max_points_gap_ms,
        }
    }
}

/// Live event source backed by bus subscriptions
pub struct ChannelEventSource {
    bus: Arc<dyn MessageBus>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    events: BoundedDropQueue<EventBatch>,
    points: BoundedDropQueue<PointCloudFrame>,
    boxes: BoundedDropQueue<BoxSet>,
    subscribed: AtomicBool,
    max_points_gap_ms: u64,
}

impl ChannelEventSource {
    /// Subscribe to the configured channels.
    ///
    /// # Errors
    /// `ChannelUnavailable` when no event channel is configured or the bus
    /// refuses a subscription (earlier subscriptions are rolled back).
    #[instrument(name = "channel_event_subscribe", skip(bus, options), fields(event_channel = ?options.event_channel))]
    pub fn subscribe(
        bus: Arc<dyn MessageBus>,
        options: ChannelEventOptions,
    ) -> Result<Self, ContractError> {
        let event_channel = options.event_channel.clone().ok_or_else(|| {
            ContractError::channel_unavailable("<events>", "an event channel must be provided")
        })?;

        let source = Self {
            bus,
            subscriptions: Mutex::new(Vec::new()),
            events: BoundedDropQueue::new("events", options.capacities.events),
            points: BoundedDropQueue::new("point_clouds", options.capacities.point_clouds),
            boxes: BoundedDropQueue::new("boxes", options.capacities.boxes),
            subscribed: AtomicBool::new(true),
            max_points_gap_ms: options.max_points_gap_ms,
        };

        let result = source
            .subscribe_events(&event_channel, options.event_type.clone())
            .and_then(|_| match &options.points_channel {
                Some(channel) => source.subscribe_points(channel),
                None => Ok(()),
            })
            .and_then(|_| match &options.box_channel {
                Some(channel) => source.subscribe_boxes(channel),
                None => Ok(()),
            });

        if let Err(err) = result {
            source.release();
            return Err(err);
        }

        info!(
            event_channel = %event_channel,
            points_channel = ?options.points_channel,
            box_channel = ?options.box_channel,
            "Channel event source subscribed"
        );
        Ok(source)
    }

    fn track(&self, id: SubscriptionId) {
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.push(id);
        }
    }

    fn subscribe_events(&self, channel: &str, event_type: String) -> Result<(), ContractError> {
        let queue = self.events.clone();
        let name = channel.to_string();
        let id = self.bus.subscribe(
            channel,
            MessageKind::Event,
            Arc::new(move |msg: BusMessage| match msg {
                BusMessage::Events(msg) => {
                    let batch = convert::events_from_message(&msg, &event_type, wall_clock_ms());
                    if batch.events.is_empty() {
                        trace!(channel = %name, "No matching events in message");
                        return;
                    }
                    queue.put(batch);
                }
                other => warn!(channel = %name, kind = %other.kind(), "Unexpected message on event channel"),
            }),
        )?;
        self.track(id);
        Ok(())
    }

    fn subscribe_points(&self, channel: &str) -> Result<(), ContractError> {
        let queue = self.points.clone();
        let name = channel.to_string();
        let id = self.bus.subscribe(
            channel,
            MessageKind::Points,
            Arc::new(move |msg: BusMessage| {
                let kind = msg.kind();
                match convert::points_from_message(msg, wall_clock_ms()) {
                    Some(Ok(frame)) => queue.put(frame),
                    Some(Err(err)) => {
                        observability::record_codec_error();
                        warn!(channel = %name, error = %err, "Dropping undecodable point cloud");
                    }
                    None => warn!(channel = %name, kind = %kind, "Unexpected message on point-cloud channel"),
                }
            }),
        )?;
        self.track(id);
        Ok(())
    }

    fn subscribe_boxes(&self, channel: &str) -> Result<(), ContractError> {
        let queue = self.boxes.clone();
        let name = channel.to_string();
        let id = self.bus.subscribe(
            channel,
            MessageKind::Box,
            Arc::new(move |msg: BusMessage| match msg {
                BusMessage::Boxes(msg) => queue.put(convert::boxes_from_message(msg, wall_clock_ms())),
                other => warn!(channel = %name, kind = %other.kind(), "Unexpected message on box channel"),
            }),
        )?;
        self.track(id);
        Ok(())
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    /// Oldest unconsumed event batch
    pub fn get_events(&self) -> Option<EventBatch> {
        self.is_subscribed().then(|| self.events.try_get()).flatten()
    }

    /// Oldest unconsumed point cloud
    pub fn get_points(&self) -> Option<PointCloudFrame> {
        self.is_subscribed().then(|| self.points.try_get()).flatten()
    }

    /// Oldest unconsumed box set
    pub fn get_boxes(&self) -> Option<BoxSet> {
        self.is_subscribed().then(|| self.boxes.try_get()).flatten()
    }

    /// Compose the oldest event batch with the next point cloud and box set.
    ///
    /// A point cloud whose device or local gap to the events exceeds the
    /// bound is dropped; the events are always delivered. Yields nothing when
    /// both the event and point-cloud queues are empty.
    pub fn get_frame(&self) -> Option<FrameBundle> {
        if !self.is_subscribed() {
            return None;
        }

        let events = self.events.try_get();
        let points = self.points.try_get();
        if events.is_none() && points.is_none() {
            return None;
        }
        let boxes = self.boxes.try_get();

        let bundle = match (events, points) {
            (Some(batch), points) => FrameBundle {
                timestamps: batch.timestamps,
                points: points.and_then(|p| self.fresh_points(&batch, p)),
                events: batch.events,
                boxes,
            },
            (None, Some(points)) => FrameBundle {
                timestamps: points.timestamps,
                events: Vec::new(),
                points: Some(points),
                boxes,
            },
            (None, None) => return None,
        };
        Some(bundle)
    }

    fn fresh_points(&self, batch: &EventBatch, points: PointCloudFrame) -> Option<PointCloudFrame> {
        let gap_ms = batch.timestamps().max_gap_ms(&points.timestamps());
        if gap_ms > self.max_points_gap_ms {
            let stale = ContractError::StaleData {
                gap_ms,
                max_ms: self.max_points_gap_ms,
            };
            observability::record_stale_points(gap_ms);
            warn!(
                event_time_ms = batch.timestamps.device_time_ms,
                points_time_ms = points.timestamps.device_time_ms,
                error = %stale,
                "Dropping stale point cloud from event bundle"
            );
            return None;
        }
        Some(points)
    }

    /// Queue depths (events, point clouds, boxes)
    pub fn depths(&self) -> (usize, usize, usize) {
        (self.events.len(), self.points.len(), self.boxes.len())
    }
}

impl PullSource for ChannelEventSource {
    type Item = FrameBundle;

    fn kind(&self) -> SourceKind {
        SourceKind::ChannelEvent
    }

    fn get(&self) -> Option<FrameBundle> {
        self.get_frame()
    }

    /// Unsubscribe and drop everything queued. The bus itself stays up.
    fn release(&self) {
        if !self.subscribed.swap(false, Ordering::AcqRel) {
            return;
        }

        let ids = self
            .subscriptions
            .lock()
            .map(|mut subs| std::mem::take(&mut *subs))
            .unwrap_or_default();
        for id in ids {
            self.bus.unsubscribe(id);
        }

        for dropped in [
            close_and_clear(&self.events),
            close_and_clear(&self.points),
            close_and_clear(&self.boxes),
        ] {
            if dropped > 0 {
                debug!(dropped, "Discarded queued items on release");
            }
        }
        info!("Channel event source released");
    }

    fn is_released(&self) -> bool {
        !self.is_subscribed()
    }
}

fn close_and_clear<T>(queue: &BoundedDropQueue<T>) -> usize {
    queue.close();
    queue.clear()
}

impl Drop for ChannelEventSource {
    fn drop(&mut self) {
        self.release();
    }
}
