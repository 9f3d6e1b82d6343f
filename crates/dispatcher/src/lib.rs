//! # Dispatcher
//!
//! Correlation output fan-out.
//!
//! Responsibilities:
//! - Consume `Correlation`s from the matcher side
//! - Fan out to every configured sink
//! - Isolate slow sinks: a full sink queue drops, it never blocks

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{Correlation, CorrelationSink};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
