//! Default region assignment for camera frames.

use contracts::{ImageFrame, RegionName, RegionTagger, SpatialBox};

/// Assigns every untagged frame to a fixed list of regions.
///
/// A frame that already carries a region keeps it (and its box).
#[derive(Debug, Clone, Default)]
pub struct StaticRegions {
    regions: Vec<RegionName>,
}

impl StaticRegions {
    pub fn new(regions: Vec<RegionName>) -> Self {
        Self { regions }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl RegionTagger for StaticRegions {
    fn regions(&self, frame: &ImageFrame) -> Vec<(RegionName, Option<SpatialBox>)> {
        match &frame.region {
            Some(region) => vec![(region.clone(), frame.spatial_box)],
            None => self.regions.iter().map(|r| (r.clone(), None)).collect(),
        }
    }
}
