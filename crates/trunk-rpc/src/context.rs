//! Request context carried with every RPC message.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and tracing information of the caller.
///
/// The context travels with every call and cast. Handlers that must see
/// records of every tenant work on an [`elevated`](RpcContext::elevated)
/// copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcContext {
    /// Request identifier used to correlate log lines
    pub request_id: String,
    /// Calling user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Calling tenant
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Whether the caller has administrative rights
    #[serde(default)]
    pub is_admin: bool,
}

impl Default for RpcContext {
    fn default() -> Self {
        Self {
            request_id: Self::new_request_id(),
            user_id: None,
            tenant_id: None,
            is_admin: false,
        }
    }
}

impl RpcContext {
    /// Creates a context for a tenant.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    /// Creates an administrative context with no tenant.
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            ..Self::default()
        }
    }

    /// Sets the calling user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns an administrative copy keeping the caller identity and
    /// request id.
    pub fn elevated(&self) -> Self {
        Self {
            is_admin: true,
            ..self.clone()
        }
    }

    fn new_request_id() -> String {
        format!("req-{}", Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_elevated_keeps_identity() {
        let ctx = RpcContext::new("tenant-a").with_user("alice");
        let elevated = ctx.elevated();

        assert!(!ctx.is_admin);
        assert!(elevated.is_admin);
        assert_eq!(elevated.request_id, ctx.request_id);
        assert_eq!(elevated.tenant_id.as_deref(), Some("tenant-a"));
        assert_eq!(elevated.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_request_ids_differ() {
        assert_ne!(RpcContext::admin().request_id, RpcContext::admin().request_id);
        assert!(RpcContext::default().request_id.starts_with("req-"));
    }
}
