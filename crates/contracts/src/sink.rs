//! CorrelationSink trait - Dispatcher output interface
//!
//! Sinks receive matcher results in emission order and own any persistence.

use crate::{ContractError, Correlation};

/// Correlation output trait
///
/// All sink implementations must implement this trait. Sinks run on their own
/// worker task, so a slow sink never blocks the matcher side.
#[trait_variant::make(CorrelationSink: Send)]
pub trait LocalCorrelationSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one correlation
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, correlation: &Correlation) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
