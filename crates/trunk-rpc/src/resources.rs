//! Versioned resource payloads exchanged over the push and pull channels.

use crate::CallbackError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use trunk_types::{SubPort, Trunk};

/// Prefix of the per-type push topics.
pub const RESOURCE_TOPIC_PREFIX: &str = "resource-push";

/// Kinds of resource that can be pushed or pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    /// A trunk with its sub-ports
    Trunk,
    /// A single sub-port
    SubPort,
}

impl ResourceType {
    /// All resource types.
    pub const ALL: [ResourceType; 2] = [ResourceType::Trunk, ResourceType::SubPort];

    /// Returns the wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Trunk => "Trunk",
            ResourceType::SubPort => "SubPort",
        }
    }

    /// Returns the current schema version of the type.
    pub const fn version(&self) -> &'static str {
        match self {
            ResourceType::Trunk => "1.1",
            ResourceType::SubPort => "1.0",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CallbackError::UnknownResourceType(s.to_string()))
    }
}

/// A typed resource payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource_type", content = "data")]
pub enum Resource {
    Trunk(Trunk),
    SubPort(SubPort),
}

impl Resource {
    /// Returns the resource type.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Resource::Trunk(_) => ResourceType::Trunk,
            Resource::SubPort(_) => ResourceType::SubPort,
        }
    }

    /// Returns the identifier of the resource.
    ///
    /// Sub-ports are identified by their port.
    pub fn id(&self) -> &str {
        match self {
            Resource::Trunk(trunk) => trunk.id.as_str(),
            Resource::SubPort(subport) => subport.port_id.as_str(),
        }
    }

    /// Returns the trunk, if this is one.
    pub fn as_trunk(&self) -> Option<&Trunk> {
        match self {
            Resource::Trunk(trunk) => Some(trunk),
            _ => None,
        }
    }

    /// Returns the sub-port, if this is one.
    pub fn as_subport(&self) -> Option<&SubPort> {
        match self {
            Resource::SubPort(subport) => Some(subport),
            _ => None,
        }
    }
}

impl From<Trunk> for Resource {
    fn from(trunk: Trunk) -> Self {
        Resource::Trunk(trunk)
    }
}

impl From<SubPort> for Resource {
    fn from(subport: SubPort) -> Self {
        Resource::SubPort(subport)
    }
}

/// Lifecycle event carried by a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl EventType {
    /// Returns the wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Updated => "updated",
            EventType::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the push topic for a resource type at a version.
///
/// # Examples
///
/// ```
/// use trunk_rpc::{resource_type_versioned_topic, ResourceType};
///
/// assert_eq!(
///     resource_type_versioned_topic(ResourceType::SubPort, "1.0"),
///     "resource-push-SubPort-1.0"
/// );
/// ```
pub fn resource_type_versioned_topic(resource_type: ResourceType, version: &str) -> String {
    format!("{}-{}-{}", RESOURCE_TOPIC_PREFIX, resource_type, version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_resource_type_from_str() {
        assert_eq!("Trunk".parse::<ResourceType>().unwrap(), ResourceType::Trunk);
        assert!(matches!(
            "trunk".parse::<ResourceType>(),
            Err(CallbackError::UnknownResourceType(_))
        ));
    }

    #[test]
    fn test_resource_is_tagged_by_type() {
        let resource = Resource::from(SubPort::vlan("t1", "p2", 100));
        let value = serde_json::to_value(&resource).unwrap();

        assert_eq!(value["resource_type"], json!("SubPort"));
        assert_eq!(value["data"]["segmentation_id"], json!(100));
        assert_eq!(resource.id(), "p2");
        assert_eq!(resource.resource_type(), ResourceType::SubPort);
        assert!(resource.as_trunk().is_none());
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(serde_json::to_value(EventType::Created).unwrap(), json!("created"));
        assert_eq!(EventType::Deleted.to_string(), "deleted");
    }

    #[test]
    fn test_trunk_topic() {
        assert_eq!(
            resource_type_versioned_topic(ResourceType::Trunk, ResourceType::Trunk.version()),
            "resource-push-Trunk-1.1"
        );
    }
}
