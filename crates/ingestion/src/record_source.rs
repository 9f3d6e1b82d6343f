//! RecordSource - sequential replay of a record container
//!
//! Demultiplexes the container by channel and declared message type and
//! invokes the registered callbacks synchronously, in recording order, on the
//! thread calling [`RecordSource::run`]. Optional pacing spaces camera
//! callbacks at least `1/fps` apart to emulate live timing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use contracts::{
    BusMessage, ContractError, FrameBundle, FrameCallback, ImageCallback, MessageKind,
    MessageTypeTable, RecordConfig, SourceKind, DEFAULT_EVENT_TYPE,
};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::convert;
use crate::error::{IngestionError, Result};
use crate::record::{channel_match, ChannelClass, ChannelDecl, RecordInfo, RecordReader};

/// Replay options
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub camera_channel: Option<String>,
    pub event_channel: Option<String>,
    pub points_channel: Option<String>,
    pub box_channel: Option<String>,
    /// Camera playback rate; `None` replays as fast as possible
    pub fps: Option<f64>,
    pub event_type: String,
    pub message_types: MessageTypeTable,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            camera_channel: None,
            event_channel: None,
            points_channel: None,
            box_channel: None,
            fps: None,
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            message_types: MessageTypeTable::default(),
        }
    }
}

impl RecordOptions {
    pub fn from_config(config: &RecordConfig, message_types: MessageTypeTable) -> Self {
        Self {
            camera_channel: config.camera_channel.clone(),
            event_channel: config.event_channel.clone(),
            points_channel: config.points_channel.clone(),
            box_channel: config.box_channel.clone(),
            fps: config.fps,
            event_type: config.event_type.clone(),
            message_types,
        }
    }

    fn channel_filter(&self) -> Vec<&str> {
        [
            &self.camera_channel,
            &self.event_channel,
            &self.box_channel,
            &self.points_channel,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect()
    }

    fn frame_interval(&self) -> Option<Duration> {
        self.fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps))
    }
}

/// Replay state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Running,
}

/// Outcome of one `run()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Messages handed to a callback
    pub dispatched: u64,
    /// Messages filtered out, unclassified, undecodable or without callback
    pub skipped: u64,
    /// Loop ended by `stop()` rather than end of container
    pub stopped: bool,
}

/// Offline source replaying a record container
pub struct RecordSource {
    path: PathBuf,
    channels: Vec<ChannelDecl>,
    options: RecordOptions,
    image_callback: RwLock<Option<ImageCallback>>,
    frame_callback: RwLock<Option<FrameCallback>>,
    running: AtomicBool,
    released: AtomicBool,
}

/// Resets the running flag on every exit path of `run()`
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RecordSource {
    /// Validate the container at `path` and prepare a replay.
    ///
    /// # Errors
    /// `ChannelUnavailable` when the container cannot be opened or parsed.
    #[instrument(name = "record_source_open", skip(options), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, options: RecordOptions) -> std::result::Result<Self, ContractError> {
        let path = path.as_ref().to_path_buf();
        let reader = RecordReader::open(&path).map_err(|err| {
            ContractError::channel_unavailable(path.display().to_string(), err.to_string())
        })?;
        let channels = reader.channels().to_vec();

        for wanted in options.channel_filter() {
            if !channels.iter().any(|c| c.name == wanted) {
                warn!(channel = wanted, "Configured channel is not in the record");
            }
        }

        info!(channels = channels.len(), fps = ?options.fps, "Record source opened");
        Ok(Self {
            path,
            channels,
            options,
            image_callback: RwLock::new(None),
            frame_callback: RwLock::new(None),
            running: AtomicBool::new(false),
            released: AtomicBool::new(false),
        })
    }

    pub fn kind(&self) -> SourceKind {
        SourceKind::Record
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_image_callback(&self, callback: ImageCallback) {
        if let Ok(mut slot) = self.image_callback.write() {
            *slot = Some(callback);
        }
    }

    pub fn set_frame_callback(&self, callback: FrameCallback) {
        if let Ok(mut slot) = self.frame_callback.write() {
            *slot = Some(callback);
        }
    }

    pub fn state(&self) -> RecordState {
        if self.running.load(Ordering::Acquire) {
            RecordState::Running
        } else {
            RecordState::Idle
        }
    }

    /// Classification of the container's channels
    pub fn channel_match(&self) -> Vec<(String, ChannelClass)> {
        channel_match(&self.channels, &self.options.message_types)
    }

    /// Scan the container for time range and counts
    pub fn info(&self) -> Result<RecordInfo> {
        RecordInfo::scan(&self.path, &self.options.message_types)
    }

    /// Ask a running replay to exit at the next message boundary
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!(path = %self.path.display(), "Record replay stop requested");
        }
    }

    /// Stop and refuse further runs. Idempotent.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.stop();
            debug!(path = %self.path.display(), "Record source released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Replay the whole container on the calling thread.
    ///
    /// Each call reopens the file and starts from the beginning.
    #[instrument(name = "record_replay", skip(self), fields(path = %self.path.display()))]
    pub fn run(&self) -> Result<ReplaySummary> {
        if self.is_released() {
            return Err(IngestionError::InvalidState("record source released".into()));
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(IngestionError::InvalidState("replay already running".into()));
        }
        let _guard = RunGuard(&self.running);

        let mut reader = RecordReader::open(&self.path)?;
        let routes = self.routes();
        let image_callback = self.image_callback.read().ok().and_then(|c| c.clone());
        let frame_callback = self.frame_callback.read().ok().and_then(|c| c.clone());
        let interval = self.options.frame_interval();

        let mut summary = ReplaySummary::default();
        let mut last_camera: Option<Instant> = None;

        while let Some(entry) = reader.next_entry()? {
            if !self.running.load(Ordering::Acquire) {
                summary.stopped = true;
                break;
            }

            let Some(Some((channel, kind))) = routes.get(entry.channel as usize) else {
                summary.skipped += 1;
                continue;
            };

            let message = match crate::record::decode_payload(*kind, &entry.payload) {
                Ok(message) => message,
                Err(err) => {
                    warn!(channel = %channel, kind = %kind, error = %err, "Skipping undecodable message");
                    summary.skipped += 1;
                    continue;
                }
            };
            let local_time_ms = entry.log_time_ns / 1_000_000;

            let delivered = match message {
                BusMessage::Camera(msg) => match &image_callback {
                    Some(callback) => {
                        pace(&mut last_camera, interval);
                        callback(convert::image_from_camera(msg, local_time_ms));
                        true
                    }
                    None => missing_callback(*kind, channel),
                },
                other => match self.bundle_for(other, channel, local_time_ms) {
                    Some(bundle) => match &frame_callback {
                        Some(callback) => {
                            callback(bundle);
                            true
                        }
                        None => missing_callback(*kind, channel),
                    },
                    None => false,
                },
            };

            if delivered {
                observability::record_record_message(kind.as_str());
                summary.dispatched += 1;
            } else {
                summary.skipped += 1;
            }
        }

        info!(
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            stopped = summary.stopped,
            "Record replay finished"
        );
        Ok(summary)
    }

    /// Per header channel: its name and kind when it is replayed
    fn routes(&self) -> Vec<Option<(String, MessageKind)>> {
        let filter = self.options.channel_filter();
        self.channels
            .iter()
            .map(|decl| {
                if !filter.is_empty() && !filter.contains(&decl.name.as_str()) {
                    return None;
                }
                match self.options.message_types.classify(&decl.message_type) {
                    Some(kind) => Some((decl.name.clone(), kind)),
                    None => {
                        trace!(channel = %decl.name, message_type = %decl.message_type, "Unclassified channel skipped");
                        None
                    }
                }
            })
            .collect()
    }

    fn bundle_for(&self, message: BusMessage, channel: &str, local_time_ms: u64) -> Option<FrameBundle> {
        match message {
            BusMessage::Events(msg) => {
                let batch =
                    convert::events_from_message(&msg, &self.options.event_type, local_time_ms);
                if batch.events.is_empty() {
                    trace!(channel, "No matching events in message");
                    return None;
                }
                Some(FrameBundle {
                    timestamps: batch.timestamps,
                    events: batch.events,
                    ..Default::default()
                })
            }
            BusMessage::Boxes(msg) => {
                let boxes = convert::boxes_from_message(msg, local_time_ms);
                Some(FrameBundle {
                    timestamps: boxes.timestamps,
                    boxes: Some(boxes),
                    ..Default::default()
                })
            }
            other => match convert::points_from_message(other, local_time_ms)? {
                Ok(points) => Some(FrameBundle {
                    timestamps: points.timestamps,
                    points: Some(points),
                    ..Default::default()
                }),
                Err(err) => {
                    observability::record_codec_error();
                    warn!(channel, error = %err, "Dropping undecodable point cloud");
                    None
                }
            },
        }
    }
}

/// Sleep so consecutive camera callbacks start at least `interval` apart
fn pace(last: &mut Option<Instant>, interval: Option<Duration>) {
    if let (Some(interval), Some(previous)) = (interval, *last) {
        let elapsed = previous.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
    *last = Some(Instant::now());
}

fn missing_callback(kind: MessageKind, channel: &str) -> bool {
    let err = ContractError::callback_missing(kind.as_str(), channel);
    observability::record_callback_missing(kind.as_str());
    error!(error = %err, "Dropping message");
    false
}

impl Drop for RecordSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Shared handle used by the adapter and stop requests from other threads
pub type SharedRecordSource = Arc<RecordSource>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordWriter;
    use bytes::Bytes;
    use contracts::{
        BaseEvent, BaseEventsMessage, BoxesMessage, CameraMessage, ImageFrame, PointCloudMessage,
        PointModel,
    };
    use std::sync::Mutex;

    fn camera(ts: u64) -> BusMessage {
        BusMessage::Camera(CameraMessage {
            timestamp_ms: ts,
            width: 1,
            height: 1,
            channels: 3,
            data: Bytes::from_static(&[0, 0, 0]),
        })
    }

    fn events(ts: u64, region: &str) -> BusMessage {
        BusMessage::Events(BaseEventsMessage {
            timestamp_ms: ts,
            events: vec![BaseEvent {
                region_attribute: DEFAULT_EVENT_TYPE.into(),
                region_name: region.into(),
                region_id: 2,
                boxes: vec![],
            }],
        })
    }

    fn write_sample(path: &Path) {
        let mut writer = RecordWriter::create(
            path,
            vec![
                ChannelDecl::new("/camera", MessageTypeTable::CAMERA),
                ChannelDecl::new("/events", MessageTypeTable::EVENTS),
                ChannelDecl::new("/points", MessageTypeTable::POINT_CLOUD),
                ChannelDecl::new("/boxes", MessageTypeTable::BOXES),
                ChannelDecl::new("/imu", "sensor.Imu"),
            ],
        )
        .unwrap();
        writer.write("/events", 1_000_000_000, &events(1000, "lane_1")).unwrap();
        writer.write("/camera", 1_080_000_000, &camera(1080)).unwrap();
        writer.write_raw("/imu", 1_090_000_000, vec![1u8, 2]).unwrap();
        writer
            .write(
                "/points",
                1_100_000_000,
                &BusMessage::PointCloud(PointCloudMessage {
                    timestamp_ms: 1100,
                    frame_start_ns: 0,
                    model: PointModel::Canonical,
                    point_size: 0,
                    core: Bytes::new(),
                    supplement: Bytes::new(),
                }),
            )
            .unwrap();
        writer
            .write(
                "/boxes",
                1_200_000_000,
                &BusMessage::Boxes(BoxesMessage {
                    timestamp_ms: 1200,
                    boxes: vec![],
                }),
            )
            .unwrap();
        writer.write("/camera", 1_300_000_000, &camera(1300)).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_open_missing_file_is_channel_unavailable() {
        let err = RecordSource::open("/definitely/not/here.rsrec", RecordOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ContractError::ChannelUnavailable { .. }));
    }

    #[test]
    fn test_replay_dispatches_in_recording_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.rsrec");
        write_sample(&path);

        let source = RecordSource::open(&path, RecordOptions::default()).unwrap();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let images = log.clone();
        source.set_image_callback(Arc::new(move |frame: ImageFrame| {
            images
                .lock()
                .unwrap()
                .push(format!("image@{}", frame.timestamps.local_time_ms));
        }));
        let frames = log.clone();
        source.set_frame_callback(Arc::new(move |bundle: FrameBundle| {
            let tag = if !bundle.events.is_empty() {
                "events"
            } else if bundle.points.is_some() {
                "points"
            } else {
                "boxes"
            };
            frames
                .lock()
                .unwrap()
                .push(format!("{tag}@{}", bundle.timestamps.local_time_ms));
        }));

        let summary = source.run().unwrap();
        assert_eq!(summary.dispatched, 5);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.stopped);
        assert_eq!(source.state(), RecordState::Idle);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["events@1000", "image@1080", "points@1100", "boxes@1200", "image@1300"]
        );

        // Re-running replays from the start
        log.lock().unwrap().clear();
        assert_eq!(source.run().unwrap().dispatched, 5);
        assert_eq!(log.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_channel_filter_and_missing_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.rsrec");
        write_sample(&path);

        let options = RecordOptions {
            camera_channel: Some("/camera".into()),
            event_channel: Some("/events".into()),
            ..Default::default()
        };
        let source = RecordSource::open(&path, options).unwrap();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        source.set_image_callback(Arc::new(move |_: ImageFrame| {
            *counter.lock().unwrap() += 1;
        }));

        // Events have no callback: logged and dropped, replay continues.
        let summary = source.run().unwrap();
        assert_eq!(*seen.lock().unwrap(), 2);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.skipped, 4);
    }

    #[test]
    fn test_fps_pacing_spaces_camera_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paced.rsrec");
        let mut writer =
            RecordWriter::create(&path, vec![ChannelDecl::new("/camera", MessageTypeTable::CAMERA)])
                .unwrap();
        writer.write("/camera", 0, &camera(0)).unwrap();
        writer.write("/camera", 1_000_000, &camera(1)).unwrap();
        writer.finish().unwrap();

        let options = RecordOptions {
            fps: Some(10.0),
            ..Default::default()
        };
        let source = RecordSource::open(&path, options).unwrap();
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = stamps.clone();
        source.set_image_callback(Arc::new(move |_: ImageFrame| {
            sink.lock().unwrap().push(Instant::now());
        }));

        source.run().unwrap();
        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 2);
        assert!(stamps[1].duration_since(stamps[0]) >= Duration::from_millis(100));
    }

    #[test]
    fn test_stop_from_callback_ends_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop.rsrec");
        write_sample(&path);

        let source = Arc::new(RecordSource::open(&path, RecordOptions::default()).unwrap());
        let handle = Arc::downgrade(&source);
        source.set_frame_callback(Arc::new(move |_: FrameBundle| {
            if let Some(source) = handle.upgrade() {
                source.stop();
            }
        }));

        let summary = source.run().unwrap();
        assert!(summary.stopped);
        assert_eq!(summary.dispatched, 1);
    }

    #[test]
    fn test_released_source_refuses_to_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("released.rsrec");
        write_sample(&path);

        let source = RecordSource::open(&path, RecordOptions::default()).unwrap();
        source.release();
        source.release();
        assert!(matches!(source.run(), Err(IngestionError::InvalidState(_))));
        assert_eq!(source.channel_match().len(), 5);
        assert_eq!(source.info().unwrap().message_count, 6);
    }
}
