//! Packed wire layout
//!
//! Per-point offsets relative to the sweep start replace absolute timestamps;
//! coordinates are stored in `y, z, x` order.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::record::{Point, PointCore, PointSupplement};

/// Packed core stride in bytes
pub const PACKED_CORE_SIZE: usize = 15;
/// Packed supplement stride in bytes
pub const PACKED_SUPPLEMENT_SIZE: usize = 4;

const NANOS_PER_MS: u64 = 1_000_000;

/// One point in packed form
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PackedPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: u16,
    /// Milliseconds since the sweep start
    pub offset_ms: u8,
    pub scan_id: i16,
    pub scan_idx: i16,
}

pub fn encode_packed_core(points: &[PackedPoint]) -> Bytes {
    let mut buf = BytesMut::with_capacity(points.len() * PACKED_CORE_SIZE);
    for p in points {
        buf.put_f32_le(p.y);
        buf.put_f32_le(p.z);
        buf.put_f32_le(p.x);
        buf.put_u16_le(p.intensity);
        buf.put_u8(p.offset_ms);
    }
    buf.freeze()
}

pub fn encode_packed_supplement(points: &[PackedPoint]) -> Bytes {
    let mut buf = BytesMut::with_capacity(points.len() * PACKED_SUPPLEMENT_SIZE);
    for p in points {
        buf.put_i16_le(p.scan_id);
        buf.put_i16_le(p.scan_idx);
    }
    buf.freeze()
}

/// Expand packed buffers into canonical points.
///
/// The point count is the minimum of both buffers' whole-record counts.
pub(crate) fn unpack(core: &[u8], supplement: &[u8], frame_start_ns: u64) -> Vec<Point> {
    let core_count = core.len() / PACKED_CORE_SIZE;
    let supplement_count = supplement.len() / PACKED_SUPPLEMENT_SIZE;

    if core.len() % PACKED_CORE_SIZE != 0 || supplement.len() % PACKED_SUPPLEMENT_SIZE != 0 {
        warn!(
            core_bytes = core.len(),
            supplement_bytes = supplement.len(),
            "Packed point buffers have trailing bytes, ignoring partial records"
        );
    }
    if core_count != supplement_count {
        warn!(
            core = core_count,
            supplement = supplement_count,
            "Packed point count mismatch, using the minimum"
        );
    }

    let count = core_count.min(supplement_count);
    let mut core = core;
    let mut supplement = supplement;
    let mut points = Vec::with_capacity(count);
    let mut overflowed = 0usize;

    for _ in 0..count {
        let y = core.get_f32_le();
        let z = core.get_f32_le();
        let x = core.get_f32_le();
        let intensity = core.get_u16_le();
        let offset_ms = core.get_u8() as u64;
        let scan_id = supplement.get_i16_le();
        let scan_idx = supplement.get_i16_le();

        let timestamp_ns = frame_start_ns
            .checked_add(offset_ms * NANOS_PER_MS)
            .unwrap_or_else(|| {
                overflowed += 1;
                u64::MAX
            });

        points.push(Point {
            core: PointCore::new(x, y, z, intensity, timestamp_ns),
            supplement: PointSupplement::scan(scan_id, scan_idx),
        });
    }

    if overflowed > 0 {
        warn!(
            frame_start_ns,
            points = overflowed,
            "Packed point timestamps overflow, clamped to u64::MAX"
        );
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_strides() {
        let point = PackedPoint::default();
        assert_eq!(encode_packed_core(&[point, point]).len(), 30);
        assert_eq!(encode_packed_supplement(&[point]).len(), 4);
    }

    #[test]
    fn test_unpack_reorders_coordinates() {
        let core = encode_packed_core(&[PackedPoint {
            x: 10.0,
            y: 20.0,
            z: 30.0,
            intensity: 7,
            offset_ms: 255,
            ..Default::default()
        }]);
        // Wire order is y, z, x
        assert_eq!(&core[0..4], &20.0f32.to_le_bytes());

        let supplement = encode_packed_supplement(&[PackedPoint::default()]);
        let points = unpack(&core, &supplement, 0);
        assert_eq!(points.len(), 1);
        assert_eq!((points[0].core.x, points[0].core.y, points[0].core.z), (10.0, 20.0, 30.0));
        assert_eq!(points[0].core.timestamp_ns, 255_000_000);
        assert_eq!(points[0].supplement.sub_id, 0);
        assert_eq!(points[0].supplement.flags, 0);
    }

    #[test]
    fn test_unpack_takes_minimum_count() {
        let three = [PackedPoint::default(); 3];
        let mut core = encode_packed_core(&three).to_vec();
        core.push(0xEE);
        let supplement = encode_packed_supplement(&three[..2]);

        let points = unpack(&core, &supplement, 500);
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.core.timestamp_ns == 500));
    }
}
