//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the workspace: the
//! timestamped data model, the already-decoded bus/record wire messages, the
//! collaborator traits (message bus, frame grabber, region tagger, sinks) and
//! the configuration surface. Business crates only depend on this crate,
//! reverse dependencies are prohibited.
//!
//! ## Time Model
//! - `device_time_ms`: clock of the originating sensor or message, monotonic
//!   only within one source, authoritative for causal ordering
//! - `local_time_ms`: ingestion wall clock assigned on receipt, the default
//!   matching clock across streams

mod config;
mod correlation;
mod error;
mod frame;
mod region;
mod sink;
mod source;
mod wire;

pub use config::*;
pub use correlation::*;
pub use error::*;
pub use frame::*;
pub use region::RegionName;
pub use sink::*;
pub use source::*;
pub use wire::*;
