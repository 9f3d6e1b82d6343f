//! Layered error definitions
//!
//! Categorized by source: config / record / source / timing / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Record Errors =====
    /// Binary record length is not a multiple of its stride
    #[error("malformed {record} buffer: {len} bytes is not a multiple of {stride}")]
    MalformedRecord {
        record: &'static str,
        len: usize,
        stride: usize,
    },

    /// Message payload could not be decoded
    #[error("payload decode error on channel '{channel}': {message}")]
    PayloadDecode { channel: String, message: String },

    // ===== Source Errors =====
    /// A source could not be opened or subscribed
    #[error("channel '{channel}' unavailable: {message}")]
    ChannelUnavailable { channel: String, message: String },

    /// A message kind arrived with no registered handler
    #[error("no callback registered for {kind} message on channel '{channel}'")]
    CallbackMissing { kind: String, channel: String },

    // ===== Timing Errors =====
    /// Timestamp gap exceeded the staleness bound
    #[error("stale data: gap {gap_ms}ms exceeds {max_ms}ms")]
    StaleData { gap_ms: u64, max_ms: u64 },

    /// Worker did not join within its bound
    #[error("worker '{worker}' did not stop within {timeout_ms}ms")]
    ShutdownTimeout { worker: String, timeout_ms: u64 },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn channel_unavailable(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChannelUnavailable {
            channel: channel.into(),
            message: message.into(),
        }
    }

    pub fn callback_missing(kind: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::CallbackMissing {
            kind: kind.into(),
            channel: channel.into(),
        }
    }

    pub fn payload_decode(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PayloadDecode {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = ContractError::channel_unavailable("/camera", "no such device");
        assert_eq!(
            err.to_string(),
            "channel '/camera' unavailable: no such device"
        );

        let err = ContractError::MalformedRecord {
            record: "point core",
            len: 50,
            stride: 24,
        };
        assert!(err.to_string().contains("50 bytes"));
    }
}
