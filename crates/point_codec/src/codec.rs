//! PointRecordCodec - canonical record encode/decode and packed transcoding

use bytemuck::Pod;
use bytes::Bytes;
use contracts::{
    CompressedPointCloudMessage, PointCloudFrame, PointCloudMessage, PointModel, Timestamps,
};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{CodecError, MalformedRecord};
use crate::packed;
use crate::record::{Point, PointCore, PointSupplement, CORE_SIZE, SUPPLEMENT_SIZE};

/// Stateless point-cloud codec
pub struct PointRecordCodec;

impl PointRecordCodec {
    /// Decode canonical 24-byte core records.
    ///
    /// # Errors
    /// `MalformedRecord` (with every whole record decoded) when the length is
    /// not a multiple of 24.
    pub fn decode_core(bytes: &[u8]) -> Result<Vec<PointCore>, MalformedRecord<PointCore>> {
        decode_records("point core", bytes, CORE_SIZE)
    }

    /// Decode canonical 12-byte supplement records.
    pub fn decode_supplement(
        bytes: &[u8],
    ) -> Result<Vec<PointSupplement>, MalformedRecord<PointSupplement>> {
        decode_records("point supplement", bytes, SUPPLEMENT_SIZE)
    }

    pub fn encode_core(records: &[PointCore]) -> Bytes {
        Bytes::copy_from_slice(bytemuck::cast_slice(records))
    }

    pub fn encode_supplement(records: &[PointSupplement]) -> Bytes {
        Bytes::copy_from_slice(bytemuck::cast_slice(records))
    }

    /// Decode both buffers of a canonical frame into full points.
    ///
    /// Ragged tails are dropped and the parallel arrays are zipped on the
    /// shorter count; both conditions are logged.
    pub fn decode_points(frame: &PointCloudFrame) -> Vec<Point> {
        let cores = Self::decode_core(&frame.core).unwrap_or_else(MalformedRecord::into_partial);
        let supplements = Self::decode_supplement(&frame.supplement)
            .unwrap_or_else(MalformedRecord::into_partial);

        if cores.len() != supplements.len() {
            warn!(
                core = cores.len(),
                supplement = supplements.len(),
                "Point core/supplement count mismatch, using the minimum"
            );
        }

        cores
            .into_iter()
            .zip(supplements)
            .map(|(core, supplement)| Point { core, supplement })
            .collect()
    }

    /// Canonical frame from points, `point_size` set to the point count
    pub fn frame_from_points(timestamps: Timestamps, points: &[Point]) -> PointCloudFrame {
        let cores: Vec<PointCore> = points.iter().map(|p| p.core).collect();
        let supplements: Vec<PointSupplement> = points.iter().map(|p| p.supplement).collect();
        PointCloudFrame {
            timestamps,
            core: Self::encode_core(&cores),
            supplement: Self::encode_supplement(&supplements),
            point_size: points.len() as u32,
            model: PointModel::Canonical,
        }
    }

    /// Frame from an uncompressed bus message; packed layouts are transcoded.
    pub fn frame_from_message(msg: PointCloudMessage, local_time_ms: u64) -> PointCloudFrame {
        let timestamps = Timestamps::new(msg.timestamp_ms, local_time_ms);
        match msg.model {
            PointModel::Canonical => PointCloudFrame {
                timestamps,
                core: msg.core,
                supplement: msg.supplement,
                point_size: msg.point_size,
                model: PointModel::Canonical,
            },
            PointModel::Packed => {
                let points = packed::unpack(&msg.core, &msg.supplement, msg.frame_start_ns);
                Self::frame_from_points(timestamps, &points)
            }
        }
    }

    /// Decompress and transcode a compressed point-cloud message.
    ///
    /// The payload is an LZ4 block holding a bincode `PointCloudMessage`.
    /// Packed payloads are re-emitted in the canonical layout with absolute
    /// timestamps `frame_start_ns + offset_ms * 1_000_000`.
    pub fn transcode_packed(
        msg: &CompressedPointCloudMessage,
        local_time_ms: u64,
    ) -> Result<PointCloudFrame, CodecError> {
        let declared = msg.uncompressed_size as usize;
        let raw = lz4_flex::block::decompress(&msg.data, declared)?;
        if raw.len() != declared {
            return Err(CodecError::SizeMismatch {
                declared,
                actual: raw.len(),
            });
        }

        let inner: PointCloudMessage = bincode::deserialize(&raw)?;
        debug!(
            model = ?inner.model,
            declared_points = inner.point_size,
            compressed = msg.data.len(),
            uncompressed = declared,
            "Transcoding compressed point cloud"
        );

        let mut frame = Self::frame_from_message(inner, local_time_ms);
        frame.timestamps.device_time_ms = msg.timestamp_ms;
        Ok(frame)
    }

    /// Wrap `msg` the way compressed publishers do (bincode, LZ4 block).
    pub fn compress(msg: &PointCloudMessage) -> Result<CompressedPointCloudMessage, CodecError> {
        let raw = bincode::serialize(msg)?;
        Ok(CompressedPointCloudMessage {
            timestamp_ms: msg.timestamp_ms,
            uncompressed_size: raw.len() as u32,
            data: Bytes::from(lz4_flex::block::compress(&raw)),
        })
    }
}

fn decode_records<T: Pod + fmt::Debug>(
    record: &'static str,
    bytes: &[u8],
    stride: usize,
) -> Result<Vec<T>, MalformedRecord<T>> {
    let chunks = bytes.chunks_exact(stride);
    let ragged = !chunks.remainder().is_empty();
    let records: Vec<T> = chunks.map(bytemuck::pod_read_unaligned).collect();

    if ragged {
        warn!(
            record,
            len = bytes.len(),
            stride,
            decoded = records.len(),
            "Point buffer length is not a multiple of the record stride"
        );
        return Err(MalformedRecord {
            record,
            len: bytes.len(),
            stride,
            records,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::PackedPoint;

    fn sample_cores() -> Vec<PointCore> {
        vec![
            PointCore::new(1.0, -2.5, 0.25, 100, 1_234_567_890),
            PointCore::new(f32::MAX, 0.0, -0.0, u16::MAX, u64::MAX),
        ]
    }

    fn sample_supplements() -> Vec<PointSupplement> {
        vec![
            PointSupplement {
                scan_id: -3,
                scan_idx: 7,
                sub_id: -70000,
                label: 1,
                elongation: 2,
                flags: 3,
                _pad: 0,
            },
            PointSupplement::scan(i16::MIN, i16::MAX),
        ]
    }

    #[test]
    fn test_core_round_trip() {
        let cores = sample_cores();
        let bytes = PointRecordCodec::encode_core(&cores);
        assert_eq!(bytes.len(), 2 * CORE_SIZE);
        assert_eq!(PointRecordCodec::decode_core(&bytes).unwrap(), cores);
    }

    #[test]
    fn test_supplement_round_trip() {
        let supplements = sample_supplements();
        let bytes = PointRecordCodec::encode_supplement(&supplements);
        assert_eq!(bytes.len(), 2 * SUPPLEMENT_SIZE);
        assert_eq!(
            PointRecordCodec::decode_supplement(&bytes).unwrap(),
            supplements
        );
    }

    #[test]
    fn test_ragged_core_decodes_whole_records() {
        let mut bytes = PointRecordCodec::encode_core(&sample_cores()).to_vec();
        bytes.extend_from_slice(&[0xAB; 5]);

        let err = PointRecordCodec::decode_core(&bytes).unwrap_err();
        assert_eq!(err.len, 53);
        assert_eq!(err.stride, CORE_SIZE);
        assert!(matches!(
            err.to_contract_error(),
            contracts::ContractError::MalformedRecord { len: 53, .. }
        ));
        assert_eq!(err.into_partial(), sample_cores());
    }

    #[test]
    fn test_decode_points_uses_minimum_count() {
        let frame = PointCloudFrame {
            timestamps: Timestamps::same(1),
            core: PointRecordCodec::encode_core(&sample_cores()),
            supplement: PointRecordCodec::encode_supplement(&sample_supplements()[..1]),
            point_size: 2,
            model: PointModel::Canonical,
        };
        let points = PointRecordCodec::decode_points(&frame);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].core, sample_cores()[0]);
    }

    fn packed_message(frame_start_ns: u64, points: &[PackedPoint]) -> PointCloudMessage {
        PointCloudMessage {
            timestamp_ms: 1000,
            frame_start_ns,
            model: PointModel::Packed,
            point_size: points.len() as u32,
            core: packed::encode_packed_core(points),
            supplement: packed::encode_packed_supplement(points),
        }
    }

    #[test]
    fn test_transcode_packed_reconstructs_absolute_timestamps() {
        let point = PackedPoint {
            x: 1.5,
            y: 2.5,
            z: 3.5,
            intensity: 42,
            offset_ms: 5,
            scan_id: 4,
            scan_idx: 9,
        };
        for (start, expected) in [
            (1_000_000_000u64, 1_005_000_000u64),
            (1_000_000_000_000, 1_000_005_000_000),
        ] {
            let compressed =
                PointRecordCodec::compress(&packed_message(start, &[point])).unwrap();
            let frame = PointRecordCodec::transcode_packed(&compressed, 77).unwrap();

            assert_eq!(frame.model, PointModel::Canonical);
            assert_eq!(frame.point_size, 1);
            assert_eq!(frame.timestamps, Timestamps::new(1000, 77));
            assert_eq!(frame.core.len(), CORE_SIZE);
            assert_eq!(frame.supplement.len(), SUPPLEMENT_SIZE);

            let points = PointRecordCodec::decode_points(&frame);
            assert_eq!(
                points[0].core,
                PointCore::new(1.5, 2.5, 3.5, 42, expected)
            );
            assert_eq!(points[0].supplement, PointSupplement::scan(4, 9));
        }
    }

    #[test]
    fn test_transcode_packed_clamps_overflowing_timestamps() {
        let point = PackedPoint {
            offset_ms: 5,
            ..Default::default()
        };
        let compressed =
            PointRecordCodec::compress(&packed_message(u64::MAX - 1, &[point])).unwrap();

        let frame = PointRecordCodec::transcode_packed(&compressed, 0).unwrap();
        let points = PointRecordCodec::decode_points(&frame);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].core.timestamp_ns, u64::MAX);
    }

    #[test]
    fn test_transcode_canonical_passes_through() {
        let msg = PointCloudMessage {
            timestamp_ms: 20,
            frame_start_ns: 0,
            model: PointModel::Canonical,
            point_size: 2,
            core: PointRecordCodec::encode_core(&sample_cores()),
            supplement: PointRecordCodec::encode_supplement(&sample_supplements()),
        };
        let compressed = PointRecordCodec::compress(&msg).unwrap();
        let frame = PointRecordCodec::transcode_packed(&compressed, 21).unwrap();

        assert_eq!(frame.core, msg.core);
        assert_eq!(frame.supplement, msg.supplement);
        assert_eq!(frame.point_size, 2);
    }

    #[test]
    fn test_transcode_rejects_garbage() {
        let msg = CompressedPointCloudMessage {
            timestamp_ms: 0,
            uncompressed_size: 64,
            data: Bytes::from_static(&[0xFF, 0xFF, 0xFF]),
        };
        assert!(PointRecordCodec::transcode_packed(&msg, 0).is_err());
    }
}
