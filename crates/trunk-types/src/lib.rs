//! Common types for trunk port synchronization.
//!
//! This crate provides the data model shared by the trunk RPC server,
//! the resource distribution channel and the host agents:
//!
//! - [`TrunkId`], [`PortId`]: Opaque resource identifiers
//! - [`Trunk`], [`SubPort`]: The trunk aggregate and its tagged sub-ports
//! - [`Port`], [`PortBinding`], [`PortUpdate`]: Port records owned by the core plugin
//! - [`TrunkStatus`]: Driver-reported trunk status
//! - [`SegmentationType`], [`SegmentationId`]: Sub-port tagging

mod ids;
mod port;
mod segmentation;
mod status;
mod trunk;

pub use ids::{PortId, TrunkId};
pub use port::{Port, PortBinding, PortUpdate, TRUNK_SUBPORT_OWNER, VIF_TYPE_UNBOUND, VNIC_NORMAL};
pub use segmentation::{SegmentationId, SegmentationType};
pub use status::TrunkStatus;
pub use trunk::{SubPort, Trunk};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid trunk status: {0}")]
    InvalidTrunkStatus(String),

    #[error("invalid segmentation type: {0:?}")]
    InvalidSegmentationType(String),

    #[error("invalid segmentation id: {0}")]
    InvalidSegmentationId(String),
}
