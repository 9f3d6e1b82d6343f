//! LogSink - logs a correlation summary via tracing

use contracts::{ContractError, Correlation, CorrelationSink};
use tracing::{info, instrument};

/// Sink that logs one line per correlation
pub struct LogSink {
    name: String,
    count: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: 0,
        }
    }

    fn log_correlation(&self, correlation: &Correlation) {
        let event = correlation.event.as_ref();
        let image = correlation.image.as_ref();

        info!(
            sink = %self.name,
            seq = self.count,
            region = %correlation.region,
            kind = correlation.kind().as_str(),
            event_time_ms = event.map(|e| e.timestamps.local_time_ms),
            image_time_ms = image.map(|i| i.timestamps.local_time_ms),
            gap_ms = correlation.gap_ms(),
            track_id = event.and_then(|e| e.spatial_box).map(|b| b.track_id),
            has_points = event.is_some_and(|e| e.points.is_some()),
            "Correlation received"
        );
    }
}

impl CorrelationSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, correlation),
        fields(sink = %self.name, region = %correlation.region)
    )]
    async fn write(&mut self, correlation: &Correlation) -> Result<(), ContractError> {
        self.log_correlation(correlation);
        self.count += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, correlations = self.count, "LogSink closed");
        Ok(())
    }
}
