//! Dispatcher error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A sink could not open its output
    #[error("failed to create sink '{name}': {source}")]
    SinkCreation {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Two sinks share a name; metrics are keyed by it
    #[error("duplicate sink name '{0}'")]
    DuplicateSink(String),
}
