//! Configuration file support for trunkd.
//!
//! Loads and validates the daemon configuration from TOML. Missing
//! sections and keys fall back to defaults. Default location:
//! `/etc/trunkd/trunkd.toml`.

use crate::constants::{DEFAULT_CONFIG_PATH, TRUNK_API_VERSION};
use crate::{TrunkError, TrunkResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use trunk_rpc::version_is_compatible;
use trunk_types::SegmentationType;

/// Host identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Host the server listens on and agents subscribe with
    #[serde(default = "default_host")]
    pub host: String,

    /// Also run a logging agent on this host
    #[serde(default)]
    pub enabled: bool,
}

/// RPC settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Trunk API version requested by agent clients
    #[serde(default = "default_rpc_version")]
    pub version: String,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines
    #[serde(default)]
    pub json: bool,
}

/// Accepted sub-port segmentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default = "default_segmentation_types")]
    pub types: Vec<String>,
}

/// Complete trunkd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkdConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub segmentation: SegmentationConfig,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_rpc_version() -> String {
    TRUNK_API_VERSION.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_segmentation_types() -> Vec<String> {
    vec![SegmentationType::VLAN.to_string()]
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            enabled: false,
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            version: default_rpc_version(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            types: default_segmentation_types(),
        }
    }
}

impl TrunkdConfig {
    /// Loads configuration from a file, falling back to defaults if the
    /// file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> TrunkResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    TrunkError::config(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(TrunkError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Loads from the default location.
    pub fn load() -> TrunkResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> TrunkResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| TrunkError::config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| {
            TrunkError::config(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// Returns the configured segmentation types.
    pub fn segmentation_types(&self) -> TrunkResult<Vec<SegmentationType>> {
        self.segmentation
            .types
            .iter()
            .map(|name| {
                name.parse::<SegmentationType>()
                    .map_err(|e| TrunkError::config(format!("segmentation.types: {}", e)))
            })
            .collect()
    }

    pub fn validate(&self) -> TrunkResult<()> {
        if self.agent.host.trim().is_empty() {
            return Err(TrunkError::config("agent.host must not be empty"));
        }

        if !version_is_compatible(TRUNK_API_VERSION, &self.rpc.version) {
            return Err(TrunkError::config(format!(
                "rpc.version {} is not served by trunk API {}",
                self.rpc.version, TRUNK_API_VERSION
            )));
        }

        if self.logging.level.trim().is_empty() {
            return Err(TrunkError::config("logging.level must not be empty"));
        }

        if self.segmentation.types.is_empty() {
            return Err(TrunkError::config(
                "segmentation.types must name at least one type",
            ));
        }
        self.segmentation_types()?;

        Ok(())
    }
}
