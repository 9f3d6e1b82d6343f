//! Container reader and writer

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use contracts::{BusMessage, MessageKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{IngestionError, Result};

pub const MAGIC: &[u8; 5] = b"RSREC";
pub const FORMAT_VERSION: u16 = 1;

/// Upper bound on a single frame, guards against corrupt length prefixes
const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Channel declared in the header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDecl {
    pub name: String,
    /// Declared message type name, classified through a `MessageTypeTable`
    pub message_type: String,
}

impl ChannelDecl {
    pub fn new(name: impl Into<String>, message_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message_type: message_type.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeader {
    pub channels: Vec<ChannelDecl>,
}

/// One recorded message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Index into the header's channel list
    pub channel: u32,
    /// Time the message was logged, nanoseconds
    pub log_time_ns: u64,
    pub payload: Bytes,
}

/// Encode the inner message of `msg` the way entries store it
pub fn encode_payload(msg: &BusMessage) -> bincode::Result<Vec<u8>> {
    match msg {
        BusMessage::Camera(m) => bincode::serialize(m),
        BusMessage::Events(m) => bincode::serialize(m),
        BusMessage::Boxes(m) => bincode::serialize(m),
        BusMessage::PointCloud(m) => bincode::serialize(m),
        BusMessage::CompressedPointCloud(m) => bincode::serialize(m),
    }
}

/// Decode an entry payload of a channel classified as `kind`
pub fn decode_payload(kind: MessageKind, payload: &[u8]) -> bincode::Result<BusMessage> {
    Ok(match kind {
        MessageKind::Camera => BusMessage::Camera(bincode::deserialize(payload)?),
        MessageKind::Event => BusMessage::Events(bincode::deserialize(payload)?),
        MessageKind::Box => BusMessage::Boxes(bincode::deserialize(payload)?),
        MessageKind::Points => BusMessage::PointCloud(bincode::deserialize(payload)?),
        MessageKind::CompressedPoints => {
            BusMessage::CompressedPointCloud(bincode::deserialize(payload)?)
        }
    })
}

fn write_frame(writer: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds u32 length"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(bytes)
}

/// Read one length-prefixed frame; `None` on a clean end of file
fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated frame length",
            ));
        }
        filled += n;
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds limit"),
        ));
    }
    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame)?;
    Ok(Some(frame))
}

/// Sequential container writer
pub struct RecordWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    index: HashMap<String, u32>,
    entries: u64,
}

impl RecordWriter {
    /// Create `path` declaring `channels` up front
    pub fn create(path: impl AsRef<Path>, channels: Vec<ChannelDecl>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        let index = channels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i as u32))
            .collect();
        write_frame(&mut writer, &bincode::serialize(&RecordHeader { channels })?)?;

        Ok(Self {
            path,
            writer,
            index,
            entries: 0,
        })
    }

    /// Append `msg` on `channel`
    pub fn write(&mut self, channel: &str, log_time_ns: u64, msg: &BusMessage) -> Result<()> {
        let payload = encode_payload(msg)?;
        self.write_raw(channel, log_time_ns, payload)
    }

    /// Append an already-encoded payload (for channels of unclassified types)
    pub fn write_raw(
        &mut self,
        channel: &str,
        log_time_ns: u64,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let channel_index = *self.index.get(channel).ok_or_else(|| {
            IngestionError::invalid_record(
                self.path.display().to_string(),
                format!("channel '{channel}' was not declared"),
            )
        })?;
        let entry = RecordEntry {
            channel: channel_index,
            log_time_ns,
            payload: payload.into(),
        };
        write_frame(&mut self.writer, &bincode::serialize(&entry)?)?;
        self.entries += 1;
        Ok(())
    }

    /// Flush and close, returning the number of entries written
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        info!(path = %self.path.display(), entries = self.entries, "Record written");
        Ok(self.entries)
    }
}

/// Sequential container reader
pub struct RecordReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: RecordHeader,
}

impl RecordReader {
    /// Open `path` and validate its magic, version and header
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut magic = [0u8; 5];
        reader
            .read_exact(&mut magic)
            .map_err(|_| IngestionError::invalid_record(&display, "file too short"))?;
        if &magic != MAGIC {
            return Err(IngestionError::invalid_record(&display, "bad magic"));
        }

        let mut version = [0u8; 2];
        reader.read_exact(&mut version)?;
        let version = u16::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(IngestionError::invalid_record(
                &display,
                format!("unsupported format version {version}"),
            ));
        }

        let header_bytes = read_frame(&mut reader)?
            .ok_or_else(|| IngestionError::invalid_record(&display, "missing header"))?;
        let header: RecordHeader = bincode::deserialize(&header_bytes)?;
        debug!(path = %path.display(), channels = header.channels.len(), "Record opened");

        Ok(Self {
            path,
            reader,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channels(&self) -> &[ChannelDecl] {
        &self.header.channels
    }

    /// Next entry in recording order, `None` at end of container
    pub fn next_entry(&mut self) -> Result<Option<RecordEntry>> {
        match read_frame(&mut self.reader)? {
            Some(frame) => Ok(Some(bincode::deserialize(&frame)?)),
            None => Ok(None),
        }
    }
}

impl Iterator for RecordReader {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BoxesMessage, CameraMessage, MessageTypeTable};

    fn channels() -> Vec<ChannelDecl> {
        vec![
            ChannelDecl::new("/camera", MessageTypeTable::CAMERA),
            ChannelDecl::new("/boxes", MessageTypeTable::BOXES),
            ChannelDecl::new("/gnss", "sensor.Gnss"),
        ]
    }

    #[test]
    fn test_write_then_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.rsrec");

        let mut writer = RecordWriter::create(&path, channels()).unwrap();
        writer
            .write(
                "/camera",
                1_000_000,
                &BusMessage::Camera(CameraMessage {
                    timestamp_ms: 1,
                    width: 1,
                    height: 1,
                    channels: 3,
                    data: Bytes::from_static(&[9, 9, 9]),
                }),
            )
            .unwrap();
        writer.write_raw("/gnss", 2_000_000, vec![1u8, 2, 3]).unwrap();
        writer
            .write(
                "/boxes",
                3_000_000,
                &BusMessage::Boxes(BoxesMessage {
                    timestamp_ms: 3,
                    boxes: vec![],
                }),
            )
            .unwrap();
        assert_eq!(writer.finish().unwrap(), 3);

        let reader = RecordReader::open(&path).unwrap();
        assert_eq!(reader.channels(), channels().as_slice());
        let entries: Vec<RecordEntry> = reader.map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries.iter().map(|e| e.channel).collect::<Vec<_>>(),
            vec![0, 2, 1]
        );

        match decode_payload(MessageKind::Camera, &entries[0].payload).unwrap() {
            BusMessage::Camera(msg) => assert_eq!(msg.data.as_ref(), &[9, 9, 9]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(entries[1].payload.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_undeclared_channel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RecordWriter::create(dir.path().join("x.rsrec"), channels()).unwrap();
        let err = writer.write_raw("/nope", 0, vec![0u8]).unwrap_err();
        assert!(matches!(err, IngestionError::InvalidRecord { .. }));
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.rsrec");
        std::fs::write(&path, b"NOTAREC-----").unwrap();
        assert!(matches!(
            RecordReader::open(&path),
            Err(IngestionError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_truncated_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.rsrec");
        let mut writer = RecordWriter::create(&path, channels()).unwrap();
        writer.write_raw("/gnss", 1, vec![7u8; 32]).unwrap();
        writer.finish().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 10);
        std::fs::write(&path, bytes).unwrap();

        let mut reader = RecordReader::open(&path).unwrap();
        assert!(reader.next_entry().is_err());
    }
}
