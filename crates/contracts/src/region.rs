//! Region names
//!
//! A region is the zone (lane, gate, trigger area) that events and camera
//! frames are scoped to. The matcher keys its queues by region and every
//! queued item carries a copy, so the name is a shared `Arc<str>`.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Name of a region, compared and hashed as the plain string.
///
/// ```
/// use contracts::RegionName;
///
/// let lane = RegionName::new("lane 1/north");
/// assert_eq!(lane.as_str(), "lane 1/north");
/// assert_eq!(lane.path_safe(), "lane_1_north");
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RegionName(Arc<str>);

impl RegionName {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name usable as a file stem: anything but `[A-Za-z0-9_-]` becomes `_`
    pub fn path_safe(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl Deref for RegionName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

// Keeps `HashMap<RegionName, _>::get(&str)` working; derived Hash on
// `Arc<str>` hashes the same as `str`.
impl Borrow<str> for RegionName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RegionName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RegionName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<RegionName> for String {
    fn from(region: RegionName) -> Self {
        region.0.to_string()
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region({:?})", &*self.0)
    }
}
