//! Record container
//!
//! Multiplexed recording of bus messages:
//!
//! ```text
//! "RSREC" | version: u16 LE | len: u32 LE | bincode(RecordHeader)
//! (len: u32 LE | bincode(RecordEntry))*
//! ```
//!
//! Each entry's payload is the bincode encoding of the message type declared
//! for its channel. Entries are stored in recording order.

mod format;
mod info;

pub use format::{
    decode_payload, encode_payload, ChannelDecl, RecordEntry, RecordHeader, RecordReader,
    RecordWriter, FORMAT_VERSION, MAGIC,
};
pub use info::{channel_match, ChannelClass, ChannelInfo, RecordInfo};
