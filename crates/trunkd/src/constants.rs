//! RPC topics, method names and defaults used by the trunk service.

/// Topic served by the trunk skeleton on every server host.
pub const TRUNK_BASE_TOPIC: &str = "trunk";

/// Version of the trunk RPC API.
pub const TRUNK_API_VERSION: &str = "1.0";

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/trunkd/trunkd.toml";

/// Wire method names.
pub mod methods {
    /// Propagate parent bindings to sub-ports
    pub const UPDATE_SUBPORT_BINDINGS: &str = "update_subport_bindings";
    /// Set the status of a trunk
    pub const UPDATE_TRUNK_STATUS: &str = "update_trunk_status";
}
