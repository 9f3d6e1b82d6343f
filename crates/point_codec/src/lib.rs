//! # Point Codec
//!
//! Binary point-cloud record codec.
//!
//! Canonical layout (little endian):
//! - core, 24 bytes: `x, y, z: f32`, `intensity: u16`, 2 pad, `timestamp_ns: u64`
//! - supplement, 12 bytes: `scan_id, scan_idx: i16`, `sub_id: i32`,
//!   `label, elongation, flags: u8`, 1 pad
//!
//! Packed wire layout (LZ4 block around a bincode `PointCloudMessage`):
//! - core, 15 bytes: `y, z, x: f32`, `intensity: u16`, `offset_ms: u8`
//! - supplement, 4 bytes: `scan_id, scan_idx: i16`

mod codec;
mod error;
mod packed;
mod record;

pub use codec::PointRecordCodec;
pub use error::{CodecError, MalformedRecord};
pub use packed::{
    encode_packed_core, encode_packed_supplement, PackedPoint, PACKED_CORE_SIZE,
    PACKED_SUPPLEMENT_SIZE,
};
pub use record::{Point, PointCore, PointSupplement, CORE_SIZE, SUPPLEMENT_SIZE};
