//! # Ingestion
//!
//! Sources that turn camera frames, bus messages and recorded containers into
//! timestamped frames, and the adapter that drives them.
//!
//! Responsibilities:
//! - Bounded drop-oldest hand-off between producer and consumer threads
//! - Live sources: `CameraSource` (latest wins) and `ChannelEventSource`
//!   (oldest first, enriched with point clouds and boxes)
//! - Offline replay of `.rsrec` record containers (`RecordSource`)
//! - `DataAdapter` orchestration of online or offline mode
//!
//! ## Usage Example (offline)
//!
//! ```ignore
//! use ingestion::{DataAdapter, RecordOptions, RecordSource};
//!
//! let adapter = DataAdapter::default();
//! adapter.set_image_callback(Arc::new(|frame| { /* tag and match */ }));
//! adapter.set_frame_callback(Arc::new(|bundle| { /* match events */ }));
//! adapter.configure_offline(RecordSource::open("drive.rsrec", RecordOptions::default())?);
//! adapter.run()?;
//! ```
//!
//! ## Mock Testing
//!
//! `LocalBus` is an in-process `MessageBus`; `SyntheticGrabber` generates
//! camera frames without a device.

mod adapter;
mod camera;
mod channel_event;
pub mod convert;
mod error;
mod mock;
mod queue;
pub mod record;
mod record_source;
mod worker;

// Re-exports
pub use adapter::{AdapterState, DataAdapter, OnlineSources};
pub use camera::{CameraSource, CameraSourceConfig};
pub use channel_event::{ChannelEventOptions, ChannelEventSource};
pub use error::{IngestionError, Result};
pub use mock::{LocalBus, SyntheticGrabber};
pub use queue::{BoundedDropQueue, QueueMetrics, QueueMetricsSnapshot};
pub use record::{ChannelClass, ChannelDecl, RecordInfo, RecordReader, RecordWriter};
pub use record_source::{RecordOptions, RecordSource, RecordState, ReplaySummary, SharedRecordSource};
pub use worker::{wall_clock_ms, WorkerHandle};
