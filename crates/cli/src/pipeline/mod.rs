//! Pipeline orchestration module.

mod orchestrator;
mod stats;
mod tagger;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;
pub use tagger::StaticRegions;
