//! Canonical point records
//!
//! Both structs are `#[repr(C)]` with explicit padding so their in-memory
//! layout is the wire layout and `bytemuck` can copy them without unsafe.

use bytemuck::{Pod, Zeroable};

// Record memory layout doubles as the little-endian wire layout.
const _: () = assert!(cfg!(target_endian = "little"));

/// Core record stride in bytes
pub const CORE_SIZE: usize = 24;
/// Supplement record stride in bytes
pub const SUPPLEMENT_SIZE: usize = 12;

/// Position, intensity and absolute timestamp of one point
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PointCore {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: u16,
    pub _pad: [u8; 2],
    /// Absolute capture time, nanoseconds
    pub timestamp_ns: u64,
}

impl PointCore {
    pub fn new(x: f32, y: f32, z: f32, intensity: u16, timestamp_ns: u64) -> Self {
        Self {
            x,
            y,
            z,
            intensity,
            _pad: [0; 2],
            timestamp_ns,
        }
    }
}

/// Scan bookkeeping of one point
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PointSupplement {
    pub scan_id: i16,
    pub scan_idx: i16,
    pub sub_id: i32,
    pub label: u8,
    pub elongation: u8,
    pub flags: u8,
    pub _pad: u8,
}

impl PointSupplement {
    /// Supplement with only scan position set
    pub fn scan(scan_id: i16, scan_idx: i16) -> Self {
        Self {
            scan_id,
            scan_idx,
            ..Self::default()
        }
    }
}

/// Core and supplement of the same point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub core: PointCore,
    pub supplement: PointSupplement,
}
