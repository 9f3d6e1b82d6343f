//! CameraSource - pull-only, latest-wins camera source
//!
//! A dedicated capture thread grabs frames into a small drop-oldest queue.
//! `get()` drains the queue and hands back only the newest frame: a stale
//! camera frame is worthless for matching.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use contracts::{ContractError, FrameGrabber, ImageFrame, PullSource, SourceKind, Timestamps};
use tracing::{debug, info, instrument, trace, warn};

use crate::queue::{BoundedDropQueue, QueueMetricsSnapshot};
use crate::worker::{wall_clock_ms, WorkerHandle};

/// Camera source tuning
#[derive(Debug, Clone)]
pub struct CameraSourceConfig {
    /// Frame queue capacity
    pub capacity: usize,
    /// Pause after a failed or empty grab
    pub retry_delay: Duration,
    /// Bound on joining the capture thread in `release()`
    pub release_timeout: Duration,
}

impl Default for CameraSourceConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            retry_delay: Duration::from_millis(100),
            release_timeout: Duration::from_secs(1),
        }
    }
}

/// Live camera source
pub struct CameraSource {
    name: String,
    queue: BoundedDropQueue<ImageFrame>,
    running: Arc<AtomicBool>,
    released: AtomicBool,
    worker: Mutex<Option<WorkerHandle>>,
    release_timeout: Duration,
}

/// Releases the grabber on every exit path of the capture thread
struct GrabberGuard(Box<dyn FrameGrabber>);

impl Drop for GrabberGuard {
    fn drop(&mut self) {
        self.0.release();
        debug!(camera = %self.0.name(), "Frame grabber released");
    }
}

impl CameraSource {
    /// Open `grabber` and start the capture thread.
    ///
    /// # Errors
    /// `ChannelUnavailable` when the grabber cannot be opened or the thread
    /// cannot be spawned.
    #[instrument(name = "camera_source_open", skip(grabber, config), fields(camera = %grabber.name()))]
    pub fn open(
        mut grabber: impl FrameGrabber + 'static,
        config: CameraSourceConfig,
    ) -> Result<Self, ContractError> {
        let name = grabber.name().to_string();
        grabber.open().map_err(|err| match err {
            ContractError::ChannelUnavailable { .. } => err,
            other => ContractError::channel_unavailable(&name, other.to_string()),
        })?;

        let queue = BoundedDropQueue::new(format!("camera:{name}"), config.capacity);
        let running = Arc::new(AtomicBool::new(true));

        let guard = GrabberGuard(Box::new(grabber));
        let worker = {
            let queue = queue.clone();
            let running = running.clone();
            let retry_delay = config.retry_delay;
            WorkerHandle::spawn(format!("capture-{name}"), move || {
                capture_loop(guard, queue, running, retry_delay)
            })
            .map_err(|err| ContractError::channel_unavailable(&name, err.to_string()))?
        };

        info!(camera = %name, capacity = queue.capacity(), "Camera source started");

        Ok(Self {
            name,
            queue,
            running,
            released: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
            release_timeout: config.release_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_metrics(&self) -> QueueMetricsSnapshot {
        self.queue.metrics()
    }
}

fn capture_loop(
    mut grabber: GrabberGuard,
    queue: BoundedDropQueue<ImageFrame>,
    running: Arc<AtomicBool>,
    retry_delay: Duration,
) {
    while running.load(Ordering::Relaxed) {
        match grabber.0.grab() {
            Ok(Some(raw)) => {
                let local = wall_clock_ms();
                queue.put(ImageFrame {
                    timestamps: Timestamps::new(raw.device_time_ms.unwrap_or(local), local),
                    pixels: raw.pixels,
                    width: raw.width,
                    height: raw.height,
                    channels: raw.channels,
                    region: None,
                    spatial_box: None,
                });
            }
            Ok(None) => {
                trace!(camera = %grabber.0.name(), "No frame ready");
                thread::sleep(retry_delay);
            }
            Err(err) => {
                warn!(camera = %grabber.0.name(), error = %err, "Frame grab failed, retrying");
                thread::sleep(retry_delay);
            }
        }
    }
}

impl PullSource for CameraSource {
    type Item = ImageFrame;

    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    /// Newest captured frame; older queued frames are discarded.
    fn get(&self) -> Option<ImageFrame> {
        if self.released.load(Ordering::Acquire) {
            return None;
        }
        self.queue.drain_latest()
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.running.store(false, Ordering::Relaxed);
        self.queue.close();
        self.queue.clear();

        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            // Timeout already logged by the handle; the thread exits on its own.
            let _ = worker.join_timeout(self.release_timeout);
        }
        info!(camera = %self.name, "Camera source released");
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}
