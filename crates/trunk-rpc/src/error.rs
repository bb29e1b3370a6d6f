//! RPC error types.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// An application error raised by a remote handler.
///
/// `kind` names the error variant on the serving side so that clients can
/// map it back to their own typed error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Error variant name on the serving side
    pub kind: String,
    /// Human readable message
    pub message: String,
}

impl RemoteError {
    /// Creates a remote error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Error type for RPC delivery and dispatch.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Nobody serves the target
    #[error("No listener for target {target}")]
    NoListener { target: String },

    /// Another listener already serves this exact target
    #[error("A listener is already serving target {target}")]
    DuplicateListener { target: String },

    /// The target cannot be used for this operation
    #[error("Invalid target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// No endpoint on the listener exposes the method
    #[error("No endpoint on {target} exposes method '{method}'")]
    UnknownMethod { target: String, method: String },

    /// The endpoint version cannot serve the requested version
    #[error("Endpoint {endpoint} (version {available}) cannot serve version {requested}")]
    IncompatibleVersion {
        endpoint: String,
        requested: String,
        available: String,
    },

    /// Arguments or reply could not be serialized
    #[error("Failed to encode {what}: {message}")]
    Encode { what: String, message: String },

    /// Arguments or reply could not be deserialized
    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// The remote handler returned an error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The handler task did not complete
    #[error("Dispatch of '{method}' failed: {message}")]
    Dispatch { method: String, message: String },
}

impl RpcError {
    /// Creates a no-listener error.
    pub fn no_listener(target: impl Display) -> Self {
        RpcError::NoListener {
            target: target.to_string(),
        }
    }

    /// Creates an invalid-target error.
    pub fn invalid_target(target: impl Display, reason: impl Into<String>) -> Self {
        RpcError::InvalidTarget {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an encode error.
    pub fn encode(what: impl Into<String>, err: impl Display) -> Self {
        RpcError::Encode {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// Creates a decode error.
    pub fn decode(what: impl Into<String>, err: impl Display) -> Self {
        RpcError::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// Creates a remote error.
    pub fn remote(kind: impl Into<String>, message: impl Into<String>) -> Self {
        RpcError::Remote(RemoteError::new(kind, message))
    }

    /// Returns the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::NoListener { .. } => "NoListener",
            RpcError::DuplicateListener { .. } => "DuplicateListener",
            RpcError::InvalidTarget { .. } => "InvalidTarget",
            RpcError::UnknownMethod { .. } => "UnknownMethod",
            RpcError::IncompatibleVersion { .. } => "IncompatibleVersion",
            RpcError::Encode { .. } => "Encode",
            RpcError::Decode { .. } => "Decode",
            RpcError::Remote(_) => "Remote",
            RpcError::Dispatch { .. } => "Dispatch",
        }
    }

    /// Returns the remote error kind if this is a remote error.
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            RpcError::Remote(remote) => Some(&remote.kind),
            _ => None,
        }
    }

    /// Converts an error raised while serving a request into the form the
    /// caller observes.
    pub fn into_remote(self) -> Self {
        match self {
            RpcError::Remote(_) => self,
            other => RpcError::remote(other.kind(), other.to_string()),
        }
    }
}

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_into_remote_wraps_local_errors() {
        let err = RpcError::decode("arguments", "missing field `status`").into_remote();
        assert_eq!(err.remote_kind(), Some("Decode"));
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_into_remote_keeps_remote_errors() {
        let err = RpcError::remote("NotFound", "trunk t1 not found").into_remote();
        assert_eq!(err.remote_kind(), Some("NotFound"));
        assert_eq!(err.to_string(), "Remote error: NotFound: trunk t1 not found");
    }
}
