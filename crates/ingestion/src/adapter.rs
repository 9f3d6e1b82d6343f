//! DataAdapter - drives one configured mode and feeds the callbacks
//!
//! Online mode pulls from a camera and/or channel event source on a worker
//! thread. Offline mode runs a record replay on the caller's thread. Either
//! way the registered callbacks see camera frames and event bundles.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::Duration;

use contracts::{
    AdapterConfig, ContractError, FrameBundle, FrameCallback, ImageCallback, ImageFrame,
    PullSource,
};
use tracing::{debug, error, info, instrument, warn};

use crate::camera::CameraSource;
use crate::channel_event::ChannelEventSource;
use crate::error::{IngestionError, Result};
use crate::record_source::RecordSource;
use crate::worker::WorkerHandle;

/// Adapter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unconfigured,
    OnlineConfigured,
    OfflineConfigured,
    Running,
}

/// Live sources for online mode; at least one must be present
#[derive(Default)]
pub struct OnlineSources {
    pub camera: Option<CameraSource>,
    pub events: Option<ChannelEventSource>,
}

enum Mode {
    Unconfigured,
    Online {
        camera: Option<Arc<CameraSource>>,
        events: Option<Arc<ChannelEventSource>>,
    },
    Offline(Arc<RecordSource>),
}

impl Mode {
    fn release(&self) {
        match self {
            Mode::Unconfigured => {}
            Mode::Online { camera, events } => {
                if let Some(camera) = camera {
                    camera.release();
                }
                if let Some(events) = events {
                    events.release();
                }
            }
            Mode::Offline(record) => record.release(),
        }
    }
}

#[derive(Default)]
struct Callbacks {
    image: RwLock<Option<ImageCallback>>,
    frame: RwLock<Option<FrameCallback>>,
}

impl Callbacks {
    fn image(&self) -> Option<ImageCallback> {
        self.image.read().ok().and_then(|c| c.clone())
    }

    fn frame(&self) -> Option<FrameCallback> {
        self.frame.read().ok().and_then(|c| c.clone())
    }

    fn dispatch_image(&self, frame: ImageFrame) {
        match self.image() {
            Some(callback) => guarded("image", || callback(frame)),
            None => missing("image"),
        }
    }

    fn dispatch_frame(&self, bundle: FrameBundle) {
        match self.frame() {
            Some(callback) => guarded("frame", || callback(bundle)),
            None => missing("frame"),
        }
    }
}

/// Run a user callback, containing any panic to this invocation
fn guarded(kind: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback = kind, "Callback panicked; continuing");
    }
}

fn missing(kind: &'static str) {
    let err = ContractError::callback_missing(kind, "online");
    observability::record_callback_missing(kind);
    error!(error = %err, "Dropping item");
}

/// Clears a run's active flag on every exit path
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    mode: Mode,
    /// Flag of the current run; each run gets its own
    active: Option<Arc<AtomicBool>>,
    worker: Option<WorkerHandle>,
}

/// Online/offline orchestration of the sources
pub struct DataAdapter {
    inner: Mutex<Inner>,
    callbacks: Arc<Callbacks>,
    config: AdapterConfig,
}

impl Default for DataAdapter {
    fn default() -> Self {
        Self::new(AdapterConfig::default())
    }
}

impl DataAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                mode: Mode::Unconfigured,
                active: None,
                worker: None,
            }),
            callbacks: Arc::new(Callbacks::default()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_image_callback(&self, callback: ImageCallback) {
        if let Ok(mut slot) = self.callbacks.image.write() {
            *slot = Some(callback);
        }
    }

    pub fn set_frame_callback(&self, callback: FrameCallback) {
        if let Ok(mut slot) = self.callbacks.frame.write() {
            *slot = Some(callback);
        }
    }

    pub fn state(&self) -> AdapterState {
        let inner = self.lock();
        if inner
            .active
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
        {
            return AdapterState::Running;
        }
        match inner.mode {
            Mode::Unconfigured => AdapterState::Unconfigured,
            Mode::Online { .. } => AdapterState::OnlineConfigured,
            Mode::Offline(_) => AdapterState::OfflineConfigured,
        }
    }

    /// Switch to online mode, stopping and releasing any previous sources.
    ///
    /// # Errors
    /// `ConfigValidation` when neither a camera nor an event source is given.
    pub fn configure_online(&self, sources: OnlineSources) -> std::result::Result<(), ContractError> {
        if sources.camera.is_none() && sources.events.is_none() {
            return Err(ContractError::config_validation(
                "online",
                "at least one of camera or event source is required",
            ));
        }
        info!(
            camera = sources.camera.is_some(),
            events = sources.events.is_some(),
            "Configuring online mode"
        );
        self.replace_mode(Mode::Online {
            camera: sources.camera.map(Arc::new),
            events: sources.events.map(Arc::new),
        });
        Ok(())
    }

    /// Switch to offline replay of `record`
    pub fn configure_offline(&self, record: RecordSource) {
        info!(path = %record.path().display(), "Configuring offline mode");
        self.replace_mode(Mode::Offline(Arc::new(record)));
    }

    fn replace_mode(&self, mode: Mode) {
        if let Err(err) = self.stop() {
            debug!(error = %err, "Previous run did not stop cleanly");
        }
        let previous = std::mem::replace(&mut self.lock().mode, mode);
        previous.release();
    }

    /// Start the configured mode.
    ///
    /// Online: spawns the worker and returns. Offline: replays the record on
    /// this thread and returns when it ends or is stopped.
    #[instrument(name = "data_adapter_run", skip(self))]
    pub fn run(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner
            .active
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
        {
            return Err(IngestionError::InvalidState("adapter already running".into()));
        }

        let (camera, events, record) = match &inner.mode {
            Mode::Unconfigured => {
                return Err(IngestionError::InvalidState("adapter not configured".into()))
            }
            Mode::Online { camera, events } => (camera.clone(), events.clone(), None),
            Mode::Offline(record) => (None, None, Some(record.clone())),
        };
        let active = Arc::new(AtomicBool::new(true));

        let Some(record) = record else {
            let worker = spawn_online(
                camera,
                events,
                self.callbacks.clone(),
                active.clone(),
                Duration::from_millis(self.config.idle_backoff_ms),
            )?;
            inner.active = Some(active);
            inner.worker = Some(worker);
            info!("Online adapter started");
            return Ok(());
        };

        if let Some(callback) = self.callbacks.image() {
            record.set_image_callback(callback);
        }
        if let Some(callback) = self.callbacks.frame() {
            record.set_frame_callback(callback);
        }
        inner.active = Some(active.clone());
        drop(inner);

        let _guard = ActiveGuard(active);
        let summary = record.run()?;
        info!(
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            stopped = summary.stopped,
            "Offline adapter finished"
        );
        Ok(())
    }

    /// Stop the current run and return to the configured state. Idempotent.
    ///
    /// # Errors
    /// `ShutdownTimeout` when the online worker misses the join bound; it is
    /// detached and exits after its current iteration.
    pub fn stop(&self) -> std::result::Result<(), ContractError> {
        let (worker, record) = {
            let mut inner = self.lock();
            if let Some(active) = inner.active.take() {
                active.store(false, Ordering::Release);
            }
            let record = match &inner.mode {
                Mode::Offline(record) => Some(record.clone()),
                _ => None,
            };
            (inner.worker.take(), record)
        };

        if let Some(record) = record {
            record.stop();
        }
        match worker {
            Some(worker) => {
                let result =
                    worker.join_timeout(Duration::from_millis(self.config.shutdown_timeout_ms));
                info!(clean = result.is_ok(), "Online adapter stopped");
                result
            }
            None => Ok(()),
        }
    }
}

fn spawn_online(
    camera: Option<Arc<CameraSource>>,
    events: Option<Arc<ChannelEventSource>>,
    callbacks: Arc<Callbacks>,
    active: Arc<AtomicBool>,
    idle_backoff: Duration,
) -> std::result::Result<WorkerHandle, ContractError> {
    WorkerHandle::spawn("data-adapter", move || {
        let _guard = ActiveGuard(active.clone());
        while active.load(Ordering::Acquire) {
            let mut idle = true;

            if let Some(frame) = camera.as_ref().and_then(|c| c.get()) {
                idle = false;
                callbacks.dispatch_image(frame);
            }
            if let Some(bundle) = events.as_ref().and_then(|e| e.get_frame()) {
                idle = false;
                callbacks.dispatch_frame(bundle);
            }

            if idle {
                thread::sleep(idle_backoff);
            }
        }
        debug!("Online adapter loop exited");
    })
}

impl Drop for DataAdapter {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "Adapter dropped while its worker was still busy");
        }
        let inner = self.lock();
        inner.mode.release();
    }
}
