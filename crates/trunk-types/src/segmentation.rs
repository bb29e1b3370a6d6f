//! Sub-port segmentation (tagging) types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a segmentation technology, e.g. `vlan`.
///
/// Which names are accepted is decided by the segmentation validators
/// registered with the trunk store, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentationType(String);

impl SegmentationType {
    /// 802.1Q VLAN tagging.
    pub const VLAN: &'static str = "vlan";

    /// Creates a segmentation type.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or contains whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, ParseError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ParseError::InvalidSegmentationType(name));
        }
        Ok(SegmentationType(name))
    }

    /// Returns the VLAN segmentation type.
    pub fn vlan() -> Self {
        SegmentationType(Self::VLAN.to_string())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SegmentationType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SegmentationType::new(s)
    }
}

/// Segmentation tag of a sub-port, unique within its trunk.
///
/// # Examples
///
/// ```
/// use trunk_types::SegmentationId;
///
/// let id = SegmentationId::new(100);
/// assert!(id.is_valid_vlan());
/// assert!(!SegmentationId::new(4095).is_valid_vlan());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentationId(u32);

impl SegmentationId {
    /// Minimum usable 802.1Q VLAN ID.
    pub const VLAN_MIN: u32 = 1;

    /// Maximum usable 802.1Q VLAN ID.
    pub const VLAN_MAX: u32 = 4094;

    /// Creates a segmentation ID.
    pub const fn new(id: u32) -> Self {
        SegmentationId(id)
    }

    /// Returns the ID as a u32.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns true if the ID is a usable VLAN tag (1-4094).
    pub const fn is_valid_vlan(&self) -> bool {
        self.0 >= Self::VLAN_MIN && self.0 <= Self::VLAN_MAX
    }
}

impl fmt::Display for SegmentationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SegmentationId {
    fn from(id: u32) -> Self {
        SegmentationId(id)
    }
}

impl From<SegmentationId> for u32 {
    fn from(id: SegmentationId) -> u32 {
        id.0
    }
}

impl FromStr for SegmentationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(SegmentationId)
            .map_err(|_| ParseError::InvalidSegmentationId(s.to_string()))
    }
}
