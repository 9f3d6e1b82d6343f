//! Pipeline orchestrator - coordinates replay, matcher and dispatcher.
//!
//! The record is replayed on a blocking thread through `DataAdapter`. Its
//! callbacks tag frames with regions, feed the matcher and push every
//! correlation to the dispatcher with `try_send`, so a slow sink never stalls
//! the replay.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{AppConfig, Correlation, FrameBundle, ImageFrame, RegionTagger};
use ingestion::{DataAdapter, RecordOptions, RecordSource};
use matcher::Matcher;
use observability::CorrelationAggregator;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinError;
use tracing::{info, warn};

use super::{PipelineStats, StaticRegions};
use crate::error::CliError;

/// Time allowed for the sinks to drain once the input closes
const SINK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated application configuration (CLI overrides applied)
    pub app: AppConfig,

    /// Emit pending items as orphans after the replay
    pub flush: bool,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Matcher-to-dispatcher channel capacity
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Hands matcher output to the dispatcher and keeps the run tallies
struct Forwarder {
    tx: mpsc::Sender<Correlation>,
    aggregator: Mutex<CorrelationAggregator>,
    images: AtomicU64,
    events: AtomicU64,
    dropped: AtomicU64,
}

impl Forwarder {
    fn new(tx: mpsc::Sender<Correlation>) -> Self {
        Self {
            tx,
            aggregator: Mutex::new(CorrelationAggregator::new()),
            images: AtomicU64::new(0),
            events: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn forward(&self, correlations: Vec<Correlation>) {
        if correlations.is_empty() {
            return;
        }

        if let Ok(mut aggregator) = self.aggregator.lock() {
            for correlation in &correlations {
                aggregator.update(correlation);
            }
        }

        for correlation in correlations {
            match self.tx.try_send(correlation) {
                Ok(()) => {}
                Err(TrySendError::Full(c)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        region = %c.region,
                        kind = c.kind().as_str(),
                        "Dispatcher queue full, dropping correlation"
                    );
                }
                Err(TrySendError::Closed(c)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(region = %c.region, "Dispatcher closed, dropping correlation");
                }
            }
        }
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Replay the configured record to completion, or until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let app = &self.config.app;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Open the record
        let record_config = app
            .record
            .as_ref()
            .ok_or_else(|| CliError::pipeline_execution("configuration has no [record] section"))?;
        let options = RecordOptions::from_config(record_config, app.message_type_table());
        let record = RecordSource::open(&record_config.path, options)
            .with_context(|| format!("Failed to open record {}", record_config.path.display()))?;

        info!(
            path = %record.path().display(),
            channels = ?record.channel_match(),
            "Record opened"
        );

        // Matcher and region tagging
        let matcher = Arc::new(Matcher::new(app.matcher.clone()));
        let tagger = StaticRegions::new(app.regions.image_regions.clone());
        if tagger.is_empty() {
            warn!("No image regions configured - untagged camera frames will be ignored");
        }

        // Dispatcher
        let (tx, rx) = mpsc::channel::<Correlation>(self.config.buffer_size);
        if app.sinks.is_empty() {
            warn!("No sinks configured - correlations will only be counted");
        }
        let dispatcher = dispatcher::create_dispatcher(app.sinks.clone(), rx)
            .context("Failed to create dispatcher")?;
        let active_sinks = app.sinks.len();
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks, "Dispatcher started");

        // Adapter callbacks
        let forwarder = Arc::new(Forwarder::new(tx));
        let adapter = Arc::new(DataAdapter::new(app.adapter));
        {
            let matcher = Arc::clone(&matcher);
            let forwarder = Arc::clone(&forwarder);
            adapter.set_image_callback(Arc::new(move |frame: ImageFrame| {
                forwarder.images.fetch_add(1, Ordering::Relaxed);
                for (region, spatial_box) in tagger.regions(&frame) {
                    forwarder.forward(matcher.add_image(frame.tagged(region, spatial_box)));
                }
            }));
        }
        {
            let matcher = Arc::clone(&matcher);
            let forwarder = Arc::clone(&forwarder);
            adapter.set_frame_callback(Arc::new(move |bundle: FrameBundle| {
                for event in bundle.into_enriched_events() {
                    forwarder.events.fetch_add(1, Ordering::Relaxed);
                    forwarder.forward(matcher.add_event(event));
                }
            }));
        }
        adapter.configure_offline(record);

        // Replay
        info!(
            max_time_diff_ms = app.matcher.max_time_diff_ms,
            policy = ?app.matcher.policy,
            clock = ?app.matcher.clock,
            "Replay running"
        );

        let mut replay = tokio::task::spawn_blocking({
            let adapter = Arc::clone(&adapter);
            move || adapter.run()
        });

        let timeout = self.config.timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        let interrupted = tokio::select! {
            joined = &mut replay => {
                replay_result(joined)?;
                false
            }
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping replay...");
                true
            }
            _ = &mut deadline => {
                warn!(timeout_secs = ?timeout.map(|t| t.as_secs()), "Pipeline timed out");
                true
            }
        };

        if interrupted {
            if let Err(e) = adapter.stop() {
                warn!(error = %e, "Adapter did not stop cleanly");
            }
            replay_result(replay.await)?;
        }

        if self.config.flush {
            let pending = matcher.flush();
            info!(count = pending.len(), "Flushed pending items as orphans");
            forwarder.forward(pending);
        }

        // Dropping the adapter releases the callbacks and their sender clones,
        // dropping the forwarder closes the dispatcher input.
        drop(adapter);
        let correlations = forwarder
            .aggregator
            .lock()
            .map(|aggregator| aggregator.summary())
            .unwrap_or_default();
        let images = forwarder.images.load(Ordering::Relaxed);
        let events = forwarder.events.load(Ordering::Relaxed);
        let forward_dropped = forwarder.dropped.load(Ordering::Relaxed);
        drop(forwarder);

        info!("Waiting for sinks to drain...");
        let sinks = match tokio::time::timeout(SINK_DRAIN_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                warn!(error = %e, "Dispatcher task failed");
                Vec::new()
            }
            Err(_) => {
                warn!("Timed out waiting for sinks to drain");
                Vec::new()
            }
        };

        let stats = PipelineStats {
            images,
            events,
            correlations,
            matcher: matcher.stats(),
            forward_dropped,
            sinks,
            active_sinks,
            interrupted,
            duration: start_time.elapsed(),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            items_per_sec = format!("{:.2}", stats.throughput()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

fn replay_result(joined: std::result::Result<ingestion::Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result.context("Record replay failed"),
        Err(e) => Err(CliError::pipeline_execution(format!("replay task failed: {e}")).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{
        BaseEvent, BaseEventsMessage, BusMessage, CameraMessage, MessageTypeTable, RecordConfig,
        DEFAULT_EVENT_TYPE,
    };
    use ingestion::{ChannelDecl, RecordWriter};

    fn camera(ts: u64) -> BusMessage {
        BusMessage::Camera(CameraMessage {
            timestamp_ms: ts,
            width: 2,
            height: 2,
            channels: 1,
            data: Bytes::from_static(&[0; 4]),
        })
    }

    fn events(ts: u64) -> BusMessage {
        BusMessage::Events(BaseEventsMessage {
            timestamp_ms: ts,
            events: vec![BaseEvent {
                region_attribute: DEFAULT_EVENT_TYPE.into(),
                region_name: "lane_1".into(),
                region_id: 1,
                boxes: vec![],
            }],
        })
    }

    fn write_record(path: &std::path::Path) {
        let channels = vec![
            ChannelDecl::new("/camera", MessageTypeTable::CAMERA),
            ChannelDecl::new("/events", MessageTypeTable::EVENTS),
        ];
        let mut writer = RecordWriter::create(path, channels).unwrap();
        writer.write("/events", 1_000_000_000, &events(1000)).unwrap();
        writer.write("/camera", 1_080_000_000, &camera(1080)).unwrap();
        writer.finish().unwrap();
    }

    fn config(path: &std::path::Path, max_time_diff_ms: u64) -> PipelineConfig {
        let mut app = AppConfig::default();
        app.matcher.max_time_diff_ms = max_time_diff_ms;
        app.regions.image_regions = vec!["lane_1".into()];
        app.record = Some(RecordConfig {
            path: path.to_path_buf(),
            camera_channel: Some("/camera".into()),
            event_channel: Some("/events".into()),
            points_channel: None,
            box_channel: None,
            fps: None,
            event_type: DEFAULT_EVENT_TYPE.to_string(),
        });
        PipelineConfig {
            app,
            flush: true,
            timeout: None,
            buffer_size: 16,
            metrics_port: None,
        }
    }

    #[tokio::test]
    async fn test_replay_matches_within_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.rsrec");
        write_record(&path);

        let stats = Pipeline::new(config(&path, 150))
            .run(std::future::pending())
            .await
            .unwrap();

        assert!(!stats.interrupted);
        assert_eq!(stats.images, 1);
        assert_eq!(stats.events, 1);
        assert_eq!(stats.correlations.totals.matched, 1);
        assert_eq!(stats.correlations.total(), 1);
    }

    #[tokio::test]
    async fn test_replay_outside_tolerance_yields_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.rsrec");
        write_record(&path);

        let stats = Pipeline::new(config(&path, 50))
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats.correlations.totals.matched, 0);
        assert_eq!(stats.correlations.totals.orphan_events, 1);
        assert_eq!(stats.correlations.totals.orphan_images, 1);
        assert_eq!(stats.matcher.orphan_images, 1);
    }

    #[tokio::test]
    async fn test_missing_record_section_fails() {
        let mut config = config(std::path::Path::new("unused.rsrec"), 150);
        config.app.record = None;

        let err = Pipeline::new(config).run(std::future::pending()).await.unwrap_err();
        assert!(err.to_string().contains("[record]"));
    }
}
