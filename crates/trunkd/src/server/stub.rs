//! Server-side notifier pushing trunk lifecycle events to agents.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::{audit_log, TrunkLifecycleHooks, TrunkResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use trunk_rpc::{EventType, Resource, ResourcePusher, RpcContext};
use trunk_types::{SubPort, Trunk};

/// Pushes trunk and sub-port events over the resource push channel.
///
/// Every call results in exactly one push. Nothing is batched, retried or
/// deduplicated.
pub struct TrunkStub {
    pusher: Arc<dyn ResourcePusher>,
}

impl TrunkStub {
    pub fn new(pusher: Arc<dyn ResourcePusher>) -> Self {
        Self { pusher }
    }

    /// Pushes `[trunk]` as created.
    pub async fn trunk_created(&self, context: &RpcContext, trunk: &Trunk) -> TrunkResult<()> {
        self.push(context, vec![Resource::Trunk(trunk.clone())], EventType::Created)
            .await
    }

    /// Pushes `[trunk]` as deleted.
    pub async fn trunk_deleted(&self, context: &RpcContext, trunk: &Trunk) -> TrunkResult<()> {
        self.push(context, vec![Resource::Trunk(trunk.clone())], EventType::Deleted)
            .await
    }

    /// Pushes the sub-ports, in the given order, as created.
    pub async fn subports_added(
        &self,
        context: &RpcContext,
        subports: &[SubPort],
    ) -> TrunkResult<()> {
        self.push(context, to_resources(subports), EventType::Created)
            .await
    }

    /// Pushes the sub-ports, in the given order, as deleted.
    pub async fn subports_deleted(
        &self,
        context: &RpcContext,
        subports: &[SubPort],
    ) -> TrunkResult<()> {
        self.push(context, to_resources(subports), EventType::Deleted)
            .await
    }

    async fn push(
        &self,
        context: &RpcContext,
        resources: Vec<Resource>,
        event_type: EventType,
    ) -> TrunkResult<()> {
        let count = resources.len();
        self.pusher.push(context, resources, event_type).await?;
        debug!(event = %event_type, count, "Trunk event pushed");
        Ok(())
    }
}

fn to_resources(subports: &[SubPort]) -> Vec<Resource> {
    subports.iter().cloned().map(Resource::SubPort).collect()
}

/// Emits the audit record of one hook invocation; the outcome is that of
/// the push.
fn audit_push(
    context: &RpcContext,
    category: AuditCategory,
    action: &str,
    object_type: &str,
    object_ids: Vec<String>,
    result: &TrunkResult<()>,
) {
    let record = AuditRecord::new(category, "TrunkStub", action)
        .with_object_type(object_type)
        .with_object_id(object_ids.join(","))
        .with_details(serde_json::json!({ "count": object_ids.len() }))
        .with_correlation_id(context.request_id.clone());
    match result {
        Ok(()) => {
            audit_log!(record.with_outcome(AuditOutcome::Success));
        }
        Err(e) => {
            audit_log!(record.with_error(e.to_string()));
        }
    }
}

fn port_ids(subports: &[SubPort]) -> Vec<String> {
    subports.iter().map(|s| s.port_id.to_string()).collect()
}

#[async_trait]
impl TrunkLifecycleHooks for TrunkStub {
    async fn on_trunk_created(&self, context: &RpcContext, trunk: &Trunk) {
        let result = self.trunk_created(context, trunk).await;
        if let Err(e) = &result {
            warn!(trunk_id = %trunk.id, error = %e, "Failed to push trunk creation");
        }
        audit_push(
            context,
            AuditCategory::ResourceCreate,
            "trunk_created",
            "trunk",
            vec![trunk.id.to_string()],
            &result,
        );
    }

    async fn on_trunk_deleted(&self, context: &RpcContext, trunk: &Trunk) {
        let result = self.trunk_deleted(context, trunk).await;
        if let Err(e) = &result {
            warn!(trunk_id = %trunk.id, error = %e, "Failed to push trunk deletion");
        }
        audit_push(
            context,
            AuditCategory::ResourceDelete,
            "trunk_deleted",
            "trunk",
            vec![trunk.id.to_string()],
            &result,
        );
    }

    async fn on_subports_added(&self, context: &RpcContext, subports: &[SubPort]) {
        let result = self.subports_added(context, subports).await;
        if let Err(e) = &result {
            warn!(count = subports.len(), error = %e, "Failed to push sub-port addition");
        }
        audit_push(
            context,
            AuditCategory::ResourceCreate,
            "subports_added",
            "subport",
            port_ids(subports),
            &result,
        );
    }

    async fn on_subports_deleted(&self, context: &RpcContext, subports: &[SubPort]) {
        let result = self.subports_deleted(context, subports).await;
        if let Err(e) = &result {
            warn!(count = subports.len(), error = %e, "Failed to push sub-port deletion");
        }
        audit_push(
            context,
            AuditCategory::ResourceDelete,
            "subports_deleted",
            "subport",
            port_ids(subports),
            &result,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use trunk_rpc::{PushError, RpcError};

    mock! {
        Pusher {}

        #[async_trait]
        impl ResourcePusher for Pusher {
            async fn push(
                &self,
                context: &RpcContext,
                resources: Vec<Resource>,
                event_type: EventType,
            ) -> Result<(), PushError>;
        }
    }

    fn subports() -> Vec<SubPort> {
        vec![
            SubPort::vlan("t1", "p3", 30),
            SubPort::vlan("t1", "p1", 10),
            SubPort::vlan("t1", "p2", 20),
        ]
    }

    fn stub_expecting(resources: Vec<Resource>, event_type: EventType) -> TrunkStub {
        let mut pusher = MockPusher::new();
        pusher
            .expect_push()
            .with(mockall::predicate::always(), eq(resources), eq(event_type))
            .times(1)
            .returning(|_, _, _| Ok(()));
        TrunkStub::new(Arc::new(pusher))
    }

    #[tokio::test]
    async fn test_trunk_created_pushes_single_trunk() {
        let trunk = Trunk::new("tenant", "parent");
        let stub = stub_expecting(vec![Resource::Trunk(trunk.clone())], EventType::Created);
        stub.trunk_created(&RpcContext::admin(), &trunk).await.unwrap();
    }

    #[tokio::test]
    async fn test_trunk_deleted_pushes_single_trunk() {
        let trunk = Trunk::new("tenant", "parent");
        let stub = stub_expecting(vec![Resource::Trunk(trunk.clone())], EventType::Deleted);
        stub.trunk_deleted(&RpcContext::admin(), &trunk).await.unwrap();
    }

    #[tokio::test]
    async fn test_subports_added_keeps_order() {
        let stub = stub_expecting(to_resources(&subports()), EventType::Created);
        stub.subports_added(&RpcContext::admin(), &subports()).await.unwrap();
    }

    #[tokio::test]
    async fn test_subports_deleted_keeps_order() {
        let stub = stub_expecting(to_resources(&subports()), EventType::Deleted);
        stub.subports_deleted(&RpcContext::admin(), &subports()).await.unwrap();
    }

    #[tokio::test]
    async fn test_context_is_forwarded() {
        let context = RpcContext::new("tenant-x").with_user("driver");
        let expected = context.clone();

        let mut pusher = MockPusher::new();
        pusher
            .expect_push()
            .withf(move |ctx, _, _| *ctx == expected)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let stub = TrunkStub::new(Arc::new(pusher));

        stub.trunk_created(&context, &Trunk::new("tenant-x", "parent"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hooks_push_once_each() {
        let trunk = Trunk::new("tenant", "parent");
        let mut pusher = MockPusher::new();
        pusher
            .expect_push()
            .with(
                mockall::predicate::always(),
                eq(vec![Resource::Trunk(trunk.clone())]),
                eq(EventType::Deleted),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        pusher
            .expect_push()
            .with(
                mockall::predicate::always(),
                eq(to_resources(&subports())),
                eq(EventType::Created),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        let stub = TrunkStub::new(Arc::new(pusher));

        stub.on_trunk_deleted(&RpcContext::admin(), &trunk).await;
        stub.on_subports_added(&RpcContext::admin(), &subports()).await;
        assert_eq!(
            port_ids(&subports()),
            vec!["p3".to_string(), "p1".to_string(), "p2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_push_failure_is_reported() {
        let mut pusher = MockPusher::new();
        pusher
            .expect_push()
            .times(1)
            .returning(|_, _, _| Err(PushError::Rpc(RpcError::no_listener("resource-push"))));
        let stub = TrunkStub::new(Arc::new(pusher));

        let err = stub
            .trunk_created(&RpcContext::admin(), &Trunk::new("tenant", "parent"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Push");

        // Hooks swallow the error after logging it
        let mut pusher = MockPusher::new();
        pusher
            .expect_push()
            .times(1)
            .returning(|_, _, _| Err(PushError::EmptyResources));
        let stub = TrunkStub::new(Arc::new(pusher));
        stub.on_subports_deleted(&RpcContext::admin(), &subports()).await;
    }
}
