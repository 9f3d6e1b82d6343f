//! # Matcher
//!
//! Region-keyed correlation of trigger events and camera frames.
//!
//! Responsibilities:
//! - Per-region bounded queues of pending events and images
//! - Pairing within a time tolerance, oldest pending first
//! - Emitting orphans for items that aged out without a counterpart
//!
//! ## Usage Example
//!
//! ```ignore
//! use matcher::{Matcher, MatcherConfig};
//!
//! let matcher = Matcher::new(MatcherConfig::default());
//!
//! for correlation in matcher.add_event(event) {
//!     // matched pair or orphan
//! }
//! ```

mod buffer;
mod engine;

// Re-exports
pub use contracts::{MatchClock, MatchPolicy, MatcherConfig};
pub use engine::{Matcher, MatcherStats};

// Re-export contracts types
pub use contracts::{Correlation, CorrelationKind, EventRecord, ImageFrame};
