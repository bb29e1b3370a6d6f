//! Error types for the trunk service.

use std::fmt::Display;
use thiserror::Error;
use trunk_rpc::{CallbackError, PushError, RpcError};

/// Trunk service errors.
#[derive(Debug, Clone, Error)]
pub enum TrunkError {
    /// Trunk or port does not exist
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Status outside the recognized set
    #[error("Invalid trunk status '{status}'")]
    InvalidStatus { status: String },

    /// Parent port has no host binding to propagate
    #[error("Binding unavailable: {message}")]
    BindingUnavailable { message: String },

    /// A port is already in use by a trunk, or a tag is taken
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Segmentation type or id rejected
    #[error("Invalid segmentation: {message}")]
    InvalidSegmentation { message: String },

    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] CallbackError),

    /// RPC delivery error
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Push error
    #[error("Push error: {0}")]
    Push(#[from] PushError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl TrunkError {
    /// Creates a not-found error for a trunk.
    pub fn trunk_not_found(trunk_id: impl Display) -> Self {
        TrunkError::NotFound {
            message: format!("trunk {}", trunk_id),
        }
    }

    /// Creates a not-found error for a port.
    pub fn port_not_found(port_id: impl Display) -> Self {
        TrunkError::NotFound {
            message: format!("port {}", port_id),
        }
    }

    /// Creates an invalid status error.
    pub fn invalid_status(status: impl Into<String>) -> Self {
        TrunkError::InvalidStatus {
            status: status.into(),
        }
    }

    /// Creates a binding unavailable error.
    pub fn binding_unavailable(message: impl Into<String>) -> Self {
        TrunkError::BindingUnavailable {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        TrunkError::Conflict {
            message: message.into(),
        }
    }

    /// Creates an invalid segmentation error.
    pub fn invalid_segmentation(message: impl Into<String>) -> Self {
        TrunkError::InvalidSegmentation {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        TrunkError::Config {
            message: message.into(),
        }
    }

    /// Returns the variant name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            TrunkError::NotFound { .. } => "NotFound",
            TrunkError::InvalidStatus { .. } => "InvalidStatus",
            TrunkError::BindingUnavailable { .. } => "BindingUnavailable",
            TrunkError::Conflict { .. } => "Conflict",
            TrunkError::InvalidSegmentation { .. } => "InvalidSegmentation",
            TrunkError::Registry(_) => "Registry",
            TrunkError::Rpc(_) => "Rpc",
            TrunkError::Push(_) => "Push",
            TrunkError::Config { .. } => "Config",
        }
    }

    /// Returns the variant payload without the display prefix.
    fn detail(&self) -> String {
        match self {
            TrunkError::NotFound { message }
            | TrunkError::BindingUnavailable { message }
            | TrunkError::Conflict { message }
            | TrunkError::InvalidSegmentation { message }
            | TrunkError::Config { message } => message.clone(),
            TrunkError::InvalidStatus { status } => status.clone(),
            TrunkError::Registry(e) => e.to_string(),
            TrunkError::Rpc(e) => e.to_string(),
            TrunkError::Push(e) => e.to_string(),
        }
    }

    /// Rebuilds a service error from an RPC reply error.
    ///
    /// Remote errors whose kind names a service error are mapped back to
    /// that variant; anything else stays an RPC error.
    pub fn from_rpc(err: RpcError) -> Self {
        let RpcError::Remote(remote) = &err else {
            return TrunkError::Rpc(err);
        };
        let message = remote.message.clone();
        match remote.kind.as_str() {
            "NotFound" => TrunkError::NotFound { message },
            "InvalidStatus" => TrunkError::InvalidStatus { status: message },
            "BindingUnavailable" => TrunkError::BindingUnavailable { message },
            "Conflict" => TrunkError::Conflict { message },
            "InvalidSegmentation" => TrunkError::InvalidSegmentation { message },
            _ => TrunkError::Rpc(err),
        }
    }
}

impl From<TrunkError> for RpcError {
    fn from(err: TrunkError) -> Self {
        match err {
            TrunkError::Rpc(e) => e,
            other => RpcError::remote(other.kind(), other.detail()),
        }
    }
}

/// Result type for trunk service operations.
pub type TrunkResult<T> = std::result::Result<T, TrunkError>;
