//! Correlation - Matcher output
//!
//! One matched `{event, image}` pair, or a single orphan that aged out of a
//! matcher queue without finding a counterpart.

use serde::{Deserialize, Serialize};

use crate::{EventRecord, ImageFrame, RegionName, Timestamps, Timestamped};

/// Correlation classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    Matched,
    OrphanEvent,
    OrphanImage,
}

impl CorrelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationKind::Matched => "matched",
            CorrelationKind::OrphanEvent => "orphan_event",
            CorrelationKind::OrphanImage => "orphan_image",
        }
    }
}

/// Matcher result. At least one side is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub region: RegionName,
    pub event: Option<EventRecord>,
    pub image: Option<ImageFrame>,
}

impl Correlation {
    pub fn matched(region: RegionName, event: EventRecord, image: ImageFrame) -> Self {
        Self {
            region,
            event: Some(event),
            image: Some(image),
        }
    }

    pub fn orphan_event(region: RegionName, event: EventRecord) -> Self {
        Self {
            region,
            event: Some(event),
            image: None,
        }
    }

    pub fn orphan_image(region: RegionName, image: ImageFrame) -> Self {
        Self {
            region,
            event: None,
            image: Some(image),
        }
    }

    pub fn kind(&self) -> CorrelationKind {
        match (&self.event, &self.image) {
            (Some(_), Some(_)) => CorrelationKind::Matched,
            (Some(_), None) => CorrelationKind::OrphanEvent,
            _ => CorrelationKind::OrphanImage,
        }
    }

    /// Timestamps of the event side when present, else of the image.
    pub fn timestamps(&self) -> Timestamps {
        match (&self.event, &self.image) {
            (Some(event), _) => event.timestamps(),
            (None, Some(image)) => image.timestamps(),
            (None, None) => Timestamps::default(),
        }
    }

    /// Absolute local-clock gap between the two sides of a match
    pub fn gap_ms(&self) -> Option<u64> {
        match (&self.event, &self.image) {
            (Some(e), Some(i)) => Some(
                e.timestamps
                    .local_time_ms
                    .abs_diff(i.timestamps.local_time_ms),
            ),
            _ => None,
        }
    }
}
