//! Codec error types

use std::fmt;

use contracts::ContractError;
use thiserror::Error;

/// Buffer length was not a multiple of the record stride.
///
/// Carries every whole record that fit, so callers can continue best-effort.
#[derive(Debug, Error)]
#[error(
    "malformed {record} buffer: {len} bytes is not a multiple of {stride} ({} whole records decoded)",
    .records.len()
)]
pub struct MalformedRecord<T: fmt::Debug> {
    pub record: &'static str,
    pub len: usize,
    pub stride: usize,
    pub records: Vec<T>,
}

impl<T: fmt::Debug> MalformedRecord<T> {
    /// Records decoded before the ragged tail
    pub fn into_partial(self) -> Vec<T> {
        self.records
    }

    pub fn to_contract_error(&self) -> ContractError {
        ContractError::MalformedRecord {
            record: self.record,
            len: self.len,
            stride: self.stride,
        }
    }
}

/// Compressed point-cloud transcoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("lz4 block decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),

    #[error("declared uncompressed size {declared} but decompressed {actual} bytes")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("inner point-cloud message decode failed: {0}")]
    InnerMessage(#[from] bincode::Error),
}

impl From<CodecError> for ContractError {
    fn from(err: CodecError) -> Self {
        ContractError::Other(err.to_string())
    }
}
