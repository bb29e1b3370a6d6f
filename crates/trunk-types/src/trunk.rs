//! Trunk and sub-port aggregates.

use crate::{PortId, SegmentationId, SegmentationType, TrunkId, TrunkStatus};
use serde::{Deserialize, Serialize};

/// A tagged sub-port enrolled in a trunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubPort {
    /// Owning trunk
    pub trunk_id: TrunkId,
    /// Port acting as the sub-interface
    pub port_id: PortId,
    /// Segmentation technology (e.g. `vlan`)
    pub segmentation_type: SegmentationType,
    /// Segmentation tag, unique within the trunk
    pub segmentation_id: SegmentationId,
}

impl SubPort {
    /// Creates a sub-port record.
    pub fn new(
        trunk_id: impl Into<TrunkId>,
        port_id: impl Into<PortId>,
        segmentation_type: SegmentationType,
        segmentation_id: SegmentationId,
    ) -> Self {
        Self {
            trunk_id: trunk_id.into(),
            port_id: port_id.into(),
            segmentation_type,
            segmentation_id,
        }
    }

    /// Creates a VLAN-tagged sub-port record.
    pub fn vlan(
        trunk_id: impl Into<TrunkId>,
        port_id: impl Into<PortId>,
        vlan: u32,
    ) -> Self {
        Self::new(trunk_id, port_id, SegmentationType::vlan(), SegmentationId::new(vlan))
    }
}

/// A trunk: a parent port carrying tagged sub-ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trunk {
    /// Trunk identifier
    pub id: TrunkId,
    /// Owning tenant
    pub tenant_id: String,
    /// Human readable name
    #[serde(default)]
    pub name: String,
    /// Parent port
    pub port_id: PortId,
    /// Administrative state
    #[serde(default = "default_admin_state_up")]
    pub admin_state_up: bool,
    /// Driver-reported status
    #[serde(default)]
    pub status: TrunkStatus,
    /// Enrolled sub-ports, in enrollment order
    #[serde(default)]
    pub sub_ports: Vec<SubPort>,
}

fn default_admin_state_up() -> bool {
    true
}

impl Trunk {
    /// Creates a trunk on the given parent port with a fresh id and the
    /// initial status.
    pub fn new(tenant_id: impl Into<String>, port_id: impl Into<PortId>) -> Self {
        Self {
            id: TrunkId::generate(),
            tenant_id: tenant_id.into(),
            name: String::new(),
            port_id: port_id.into(),
            admin_state_up: true,
            status: TrunkStatus::INITIAL,
            sub_ports: Vec::new(),
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the sub-port using the given port, if enrolled.
    pub fn subport(&self, port_id: &str) -> Option<&SubPort> {
        self.sub_ports.iter().find(|s| s.port_id.as_str() == port_id)
    }

    /// Returns the sub-port using the given segmentation tag, if any.
    pub fn subport_by_segmentation(
        &self,
        segmentation_type: &SegmentationType,
        segmentation_id: SegmentationId,
    ) -> Option<&SubPort> {
        self.sub_ports.iter().find(|s| {
            &s.segmentation_type == segmentation_type && s.segmentation_id == segmentation_id
        })
    }

    /// Returns true if the port is the parent or one of the sub-ports.
    pub fn uses_port(&self, port_id: &str) -> bool {
        self.port_id.as_str() == port_id || self.subport(port_id).is_some()
    }
}
