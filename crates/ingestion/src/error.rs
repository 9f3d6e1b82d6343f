//! Ingestion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Contract-level failure (unavailable channel, shutdown timeout, ...)
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Record container is not in the expected format
    #[error("invalid record container '{path}': {message}")]
    InvalidRecord { path: String, message: String },

    /// Record entry or header could not be (de)serialized
    #[error("record encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 当前状态下不允许的操作
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl IngestionError {
    pub fn invalid_record(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Ingestion Result 别名
pub type Result<T> = std::result::Result<T, IngestionError>;
