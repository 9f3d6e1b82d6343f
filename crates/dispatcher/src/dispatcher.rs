//! Dispatcher - main loop for fan-out to sinks

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{Correlation, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Builds a [`Dispatcher`] from configuration
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<Correlation>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<Correlation>) -> Self {
        Self { config, input_rx }
    }

    /// Create every sink and spawn its worker
    #[instrument(name = "dispatcher_builder_build", skip(self), fields(sink_count = self.config.sinks.len()))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut names = HashSet::new();
        if let Some(dup) = self.config.sinks.iter().find(|s| !names.insert(s.name.as_str())) {
            return Err(DispatcherError::DuplicateSink(dup.name.clone()));
        }

        let handles = self
            .config
            .sinks
            .iter()
            .map(create_sink_handle)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }
}

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|source| DispatcherError::SinkCreation {
                    name: config.name.clone(),
                    source,
                })?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Fans correlations out to sinks until its input closes
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<Correlation>,
}

impl Dispatcher {
    /// Dispatcher over already spawned sink handles
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<Correlation>) -> Self {
        Self { handles, input_rx }
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run until the input channel closes, then drain and close every sink.
    ///
    /// Returns the final per-sink metrics.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<(String, MetricsSnapshot)> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut count: u64 = 0;
        while let Some(correlation) = self.input_rx.recv().await {
            count += 1;
            self.dispatch(correlation);

            if count.is_multiple_of(100) {
                debug!(correlations = count, "Dispatcher progress");
            }
        }

        info!(correlations = count, "Dispatcher input closed, shutting down");

        let metrics: Vec<_> = self
            .handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().clone()))
            .collect();
        for handle in self.handles {
            handle.shutdown().await;
        }

        info!("Dispatcher shutdown complete");
        metrics
            .into_iter()
            .map(|(name, m)| (name, m.snapshot()))
            .collect()
    }

    pub fn spawn(self) -> JoinHandle<Vec<(String, MetricsSnapshot)>> {
        tokio::spawn(self.run())
    }

    fn dispatch(&self, correlation: Correlation) {
        if let Some((last, rest)) = self.handles.split_last() {
            for handle in rest {
                handle.try_send(correlation.clone());
            }
            last.try_send(correlation);
        }
    }
}

/// Build a dispatcher from sink configs. Must be called inside a tokio runtime.
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<Correlation>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build()
}
