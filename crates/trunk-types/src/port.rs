//! Port records and host bindings.
//!
//! Ports are owned by the core networking plugin. The trunk service only
//! reads them and rewrites the binding of sub-ports so that it follows the
//! binding of the parent port.

use crate::PortId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Device owner stamped on ports enrolled as trunk sub-ports.
pub const TRUNK_SUBPORT_OWNER: &str = "trunk:subport";

/// Default VNIC type of a port.
pub const VNIC_NORMAL: &str = "normal";

/// VIF type of a port that is not bound to any host.
pub const VIF_TYPE_UNBOUND: &str = "unbound";

/// Host binding attributes of a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Compute host the port is bound to (empty when unbound).
    #[serde(default)]
    pub host_id: String,
    /// Driver-specific binding profile.
    #[serde(default)]
    pub profile: BTreeMap<String, String>,
    /// VNIC type requested for the port.
    #[serde(default = "default_vnic_type")]
    pub vnic_type: String,
    /// VIF type chosen by the mechanism driver.
    #[serde(default = "default_vif_type")]
    pub vif_type: String,
    /// VIF details chosen by the mechanism driver.
    #[serde(default)]
    pub vif_details: BTreeMap<String, String>,
}

fn default_vnic_type() -> String {
    VNIC_NORMAL.to_string()
}

fn default_vif_type() -> String {
    VIF_TYPE_UNBOUND.to_string()
}

impl Default for PortBinding {
    fn default() -> Self {
        Self {
            host_id: String::new(),
            profile: BTreeMap::new(),
            vnic_type: default_vnic_type(),
            vif_type: default_vif_type(),
            vif_details: BTreeMap::new(),
        }
    }
}

impl PortBinding {
    /// Creates a binding to the given host with default attributes.
    pub fn for_host(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            ..Self::default()
        }
    }

    /// Returns the bound host, or `None` if the port is unbound.
    pub fn host(&self) -> Option<&str> {
        if self.host_id.is_empty() {
            None
        } else {
            Some(&self.host_id)
        }
    }

    /// Returns true if the port is bound to a host.
    pub fn is_bound(&self) -> bool {
        self.host().is_some()
    }

    /// Adds a profile entry.
    pub fn with_profile(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.profile.insert(key.into(), value.into());
        self
    }

    /// Sets the VIF type and details.
    pub fn with_vif(
        mut self,
        vif_type: impl Into<String>,
        vif_details: BTreeMap<String, String>,
    ) -> Self {
        self.vif_type = vif_type.into();
        self.vif_details = vif_details;
        self
    }
}

/// A network port record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port identifier
    pub id: PortId,
    /// Owning tenant
    #[serde(default)]
    pub tenant_id: String,
    /// Device owner (e.g. `trunk:subport`)
    #[serde(default)]
    pub device_owner: String,
    /// Host binding
    #[serde(default)]
    pub binding: PortBinding,
}

impl Port {
    /// Creates an unbound port.
    pub fn new(id: impl Into<PortId>, tenant_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            device_owner: String::new(),
            binding: PortBinding::default(),
        }
    }

    /// Returns the bound host, if any.
    pub fn host_id(&self) -> Option<&str> {
        self.binding.host()
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, update: &PortUpdate) {
        if let Some(binding) = &update.binding {
            self.binding = binding.clone();
        }
        if let Some(owner) = &update.device_owner {
            self.device_owner = owner.clone();
        }
    }
}

/// Partial update of a port; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortUpdate {
    /// New binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<PortBinding>,
    /// New device owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_owner: Option<String>,
}

impl PortUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the binding.
    pub fn with_binding(mut self, binding: PortBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Sets the device owner.
    pub fn with_device_owner(mut self, owner: impl Into<String>) -> Self {
        self.device_owner = Some(owner.into());
        self
    }

    /// Returns true if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.binding.is_none() && self.device_owner.is_none()
    }
}
