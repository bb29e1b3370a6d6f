//! Versioned resource push channel.
//!
//! The server side ([`ResourcesPushRpcApi`]) casts a batch of resources of
//! one type to the fanout topic of that type and version. Every agent
//! subscribed with a [`ResourcesPushRpcCallback`] hands the batch to its
//! registered consumers.

use crate::{
    resource_type_versioned_topic, ConsumerCallbacksManager, EventType, MethodTable, Resource,
    ResourceType, RpcContext, RpcEndpoint, RpcError, RpcResult, RpcServer, Target, Transport,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Wire method of the push channel.
pub const PUSH_METHOD: &str = "push";

/// Error type for push operations.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    /// Nothing to push
    #[error("Cannot push an empty resource list")]
    EmptyResources,

    /// A batch must carry a single resource type
    #[error("Cannot push {found} in a batch of {expected}")]
    MixedResourceTypes {
        expected: ResourceType,
        found: ResourceType,
    },

    /// Delivery failed
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Message carried by the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub resource_type: ResourceType,
    pub version: String,
    pub event_type: EventType,
    pub resources: Vec<Resource>,
}

/// Checks that a batch is non-empty and homogeneous; returns its type.
pub fn validate_resources(resources: &[Resource]) -> Result<ResourceType, PushError> {
    let first = resources.first().ok_or(PushError::EmptyResources)?;
    let expected = first.resource_type();
    match resources.iter().find(|r| r.resource_type() != expected) {
        Some(other) => Err(PushError::MixedResourceTypes {
            expected,
            found: other.resource_type(),
        }),
        None => Ok(expected),
    }
}

/// Sends resource events to every interested agent.
#[async_trait]
pub trait ResourcePusher: Send + Sync {
    /// Pushes a homogeneous batch of resources with one event.
    async fn push(
        &self,
        context: &RpcContext,
        resources: Vec<Resource>,
        event_type: EventType,
    ) -> Result<(), PushError>;
}

/// Server-side push client.
pub struct ResourcesPushRpcApi {
    transport: Arc<dyn Transport>,
}

impl ResourcesPushRpcApi {
    /// Creates a push client on a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Returns the fanout target for a resource type at its current
    /// version.
    pub fn target(resource_type: ResourceType) -> Target {
        let version = resource_type.version();
        Target::new(resource_type_versioned_topic(resource_type, version))
            .with_version(version)
            .fanout()
    }
}

#[async_trait]
impl ResourcePusher for ResourcesPushRpcApi {
    #[instrument(skip_all, fields(event = %event_type, count = resources.len()))]
    async fn push(
        &self,
        context: &RpcContext,
        resources: Vec<Resource>,
        event_type: EventType,
    ) -> Result<(), PushError> {
        let resource_type = validate_resources(&resources)?;
        let target = Self::target(resource_type);
        let payload = PushPayload {
            resource_type,
            version: resource_type.version().to_string(),
            event_type,
            resources,
        };
        let args =
            serde_json::to_value(&payload).map_err(|e| RpcError::encode("push payload", e))?;

        self.transport.cast(&target, context, PUSH_METHOD, args).await?;
        debug!(rpc_target = %target, "Pushed resources");
        Ok(())
    }
}

/// Agent-side endpoint receiving pushed resources.
pub struct ResourcesPushRpcCallback {
    consumers: Arc<ConsumerCallbacksManager>,
}

impl ResourcesPushRpcCallback {
    /// Endpoint name.
    pub const NAME: &'static str = "ResourcesPushRpcCallback";

    /// Creates a callback delivering to `consumers`.
    pub fn new(consumers: Arc<ConsumerCallbacksManager>) -> Self {
        Self { consumers }
    }

    /// Builds the RPC endpoint, answering at the given version.
    pub fn endpoint(self: &Arc<Self>, version: &str) -> Arc<dyn RpcEndpoint> {
        let endpoint = MethodTable::new(Self::NAME, version)
            .method(
                PUSH_METHOD,
                |callback: Arc<Self>, context: RpcContext, payload: PushPayload| async move {
                    callback.handle_push(&context, payload).await
                },
            )
            .bind(Arc::clone(self));
        Arc::new(endpoint)
    }

    /// Subscribes this host to pushes of a resource type.
    pub async fn subscribe(
        self: &Arc<Self>,
        transport: &dyn Transport,
        resource_type: ResourceType,
        host: &str,
    ) -> RpcResult<RpcServer> {
        let version = resource_type.version();
        let target =
            Target::new(resource_type_versioned_topic(resource_type, version)).with_server(host);
        transport.serve(target, vec![self.endpoint(version)]).await
    }

    /// Delivers one pushed payload to the consumers of its type.
    pub async fn handle_push(&self, context: &RpcContext, payload: PushPayload) -> RpcResult<()> {
        let PushPayload {
            resource_type,
            version,
            event_type,
            resources,
        } = payload;

        if let Some(bad) = resources.iter().find(|r| r.resource_type() != resource_type) {
            return Err(RpcError::decode(
                "push payload",
                format!("{} resource in a {} batch", bad.resource_type(), resource_type),
            ));
        }

        let delivered = self
            .consumers
            .dispatch(context, resource_type, resources, event_type)
            .await;
        if delivered == 0 {
            warn!(resource_type = %resource_type, version = %version, "Push received with no consumer");
        } else {
            debug!(resource_type = %resource_type, version = %version, event = %event_type, delivered, "Push delivered");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalTransport, ResourceConsumer};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::Notify;
    use trunk_types::{SubPort, Trunk};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(EventType, Vec<Resource>)>>,
        notify: Notify,
    }

    #[async_trait]
    impl ResourceConsumer for Recorder {
        async fn handle(
            &self,
            _context: &RpcContext,
            _resource_type: ResourceType,
            resources: Vec<Resource>,
            event_type: EventType,
        ) {
            self.events.lock().push((event_type, resources));
            self.notify.notify_one();
        }
    }

    async fn agent(
        transport: &LocalTransport,
        host: &str,
    ) -> (Arc<Recorder>, RpcServer) {
        let recorder = Arc::new(Recorder::default());
        let consumers = Arc::new(ConsumerCallbacksManager::new());
        consumers.register(recorder.clone(), ResourceType::SubPort).unwrap();
        let callback = Arc::new(ResourcesPushRpcCallback::new(consumers));
        let server = callback
            .subscribe(transport, ResourceType::SubPort, host)
            .await
            .unwrap();
        (recorder, server)
    }

    #[test]
    fn test_validate_resources() {
        assert!(matches!(validate_resources(&[]), Err(PushError::EmptyResources)));

        let mixed = vec![
            Resource::from(SubPort::vlan("t1", "p1", 10)),
            Resource::from(Trunk::new("tenant", "parent")),
        ];
        assert!(matches!(
            validate_resources(&mixed),
            Err(PushError::MixedResourceTypes {
                expected: ResourceType::SubPort,
                found: ResourceType::Trunk
            })
        ));
    }

    #[tokio::test]
    async fn test_push_reaches_every_agent() {
        let transport = LocalTransport::new();
        let (host_a, _server_a) = agent(&transport, "compute-a").await;
        let (host_b, _server_b) = agent(&transport, "compute-b").await;

        let pusher = ResourcesPushRpcApi::new(Arc::new(transport.clone()));
        let subports = vec![
            Resource::from(SubPort::vlan("t1", "p1", 10)),
            Resource::from(SubPort::vlan("t1", "p2", 20)),
        ];
        pusher
            .push(&RpcContext::admin(), subports.clone(), EventType::Created)
            .await
            .unwrap();

        for host in [&host_a, &host_b] {
            tokio::time::timeout(Duration::from_secs(1), host.notify.notified())
                .await
                .unwrap();
            assert_eq!(*host.events.lock(), vec![(EventType::Created, subports.clone())]);
        }
    }

    #[tokio::test]
    async fn test_push_without_subscribers_is_ok() {
        let pusher = ResourcesPushRpcApi::new(Arc::new(LocalTransport::new()));
        pusher
            .push(
                &RpcContext::admin(),
                vec![Resource::from(Trunk::new("tenant", "parent"))],
                EventType::Deleted,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_rejects_empty_batch() {
        let pusher = ResourcesPushRpcApi::new(Arc::new(LocalTransport::new()));
        let err = pusher
            .push(&RpcContext::admin(), Vec::new(), EventType::Created)
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::EmptyResources));
    }

    #[tokio::test]
    async fn test_callback_rejects_mislabelled_payload() {
        let callback = ResourcesPushRpcCallback::new(Arc::new(ConsumerCallbacksManager::new()));
        let payload = PushPayload {
            resource_type: ResourceType::Trunk,
            version: "1.1".to_string(),
            event_type: EventType::Created,
            resources: vec![Resource::from(SubPort::vlan("t1", "p1", 10))],
        };
        let err = callback
            .handle_push(&RpcContext::admin(), payload)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode { .. }));
    }
}
