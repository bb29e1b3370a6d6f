//! Host-side trunk plumbing.
//!
//! An agent talks to the server through [`TrunkServerClient`] and learns
//! about trunk changes through [`TrunkAgentSkeleton`], which subscribes to
//! the push topics of both resource types and hands every event to a
//! [`TrunkEventHandler`]. [`SubportBindingHandler`] closes the loop by
//! binding pushed sub-ports through the client.

use crate::constants::{methods, TRUNK_API_VERSION, TRUNK_BASE_TOPIC};
use crate::server::{TrunkRpcApi, UpdateSubportBindingsArgs, UpdateTrunkStatusArgs};
use crate::{TrunkError, TrunkResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use trunk_rpc::{
    ConsumerCallbacksManager, EventType, Resource, ResourceConsumer, ResourceType,
    ResourcesPullRpcApi, ResourcesPushRpcCallback, RpcContext, RpcError, RpcServer, Target,
    Transport,
};
use trunk_types::{Port, SubPort, Trunk, TrunkId, TrunkStatus};

/// Agent-side client of the trunk server.
pub struct TrunkServerClient {
    transport: Arc<dyn Transport>,
    target: Target,
    pull: ResourcesPullRpcApi,
}

impl TrunkServerClient {
    /// Creates a client addressing the trunk server on `server`.
    pub fn new(transport: Arc<dyn Transport>, server: impl Into<String>) -> Self {
        let target = Target::new(TRUNK_BASE_TOPIC)
            .with_server(server)
            .with_version(TRUNK_API_VERSION);
        Self {
            pull: ResourcesPullRpcApi::new(Arc::clone(&transport)),
            transport,
            target,
        }
    }

    /// Requests a different trunk API version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.target = self.target.with_version(version);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the trunk whose parent or sub-port is `port_id`.
    #[instrument(skip(self, context))]
    pub async fn get_trunk_by_port(
        &self,
        context: &RpcContext,
        port_id: &str,
    ) -> TrunkResult<Option<Trunk>> {
        let resource = self
            .pull
            .pull(context, ResourceType::Trunk, port_id)
            .await
            .map_err(TrunkError::from_rpc)?;
        Ok(resource.and_then(|r| r.as_trunk().cloned()))
    }

    async fn call<A, R>(&self, context: &RpcContext, method: &str, args: &A) -> TrunkResult<R>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let args = serde_json::to_value(args).map_err(|e| RpcError::encode(method, e))?;
        let reply = self
            .transport
            .call(&self.target, context, method, args)
            .await
            .map_err(TrunkError::from_rpc)?;
        Ok(serde_json::from_value(reply).map_err(|e| RpcError::decode(method, e))?)
    }
}

#[async_trait]
impl TrunkRpcApi for TrunkServerClient {
    #[instrument(skip(self, context, subports), fields(count = subports.len()))]
    async fn update_subport_bindings(
        &self,
        context: &RpcContext,
        subports: Vec<SubPort>,
    ) -> TrunkResult<BTreeMap<TrunkId, Vec<Port>>> {
        let args = UpdateSubportBindingsArgs { subports };
        self.call(context, methods::UPDATE_SUBPORT_BINDINGS, &args)
            .await
    }

    #[instrument(skip(self, context))]
    async fn update_trunk_status(
        &self,
        context: &RpcContext,
        trunk_id: &str,
        status: &str,
    ) -> TrunkResult<()> {
        let args = UpdateTrunkStatusArgs {
            trunk_id: trunk_id.to_string(),
            status: status.to_string(),
        };
        self.call(context, methods::UPDATE_TRUNK_STATUS, &args).await
    }
}

/// Receiver of pushed trunk events on an agent.
#[async_trait]
pub trait TrunkEventHandler: Send + Sync {
    async fn handle_trunks(&self, context: &RpcContext, trunks: Vec<Trunk>, event_type: EventType);

    async fn handle_subports(
        &self,
        context: &RpcContext,
        subports: Vec<SubPort>,
        event_type: EventType,
    );
}

/// Adapts a [`TrunkEventHandler`] to the consumer registry.
struct HandlerConsumer {
    handler: Arc<dyn TrunkEventHandler>,
}

#[async_trait]
impl ResourceConsumer for HandlerConsumer {
    async fn handle(
        &self,
        context: &RpcContext,
        resource_type: ResourceType,
        resources: Vec<Resource>,
        event_type: EventType,
    ) {
        match resource_type {
            ResourceType::Trunk => {
                let trunks = resources
                    .into_iter()
                    .filter_map(|r| match r {
                        Resource::Trunk(trunk) => Some(trunk),
                        Resource::SubPort(_) => None,
                    })
                    .collect();
                self.handler.handle_trunks(context, trunks, event_type).await;
            }
            ResourceType::SubPort => {
                let subports = resources
                    .into_iter()
                    .filter_map(|r| match r {
                        Resource::SubPort(subport) => Some(subport),
                        Resource::Trunk(_) => None,
                    })
                    .collect();
                self.handler
                    .handle_subports(context, subports, event_type)
                    .await;
            }
        }
    }
}

/// Agent-side receiver of trunk pushes.
pub struct TrunkAgentSkeleton {
    host: String,
    consumers: Arc<ConsumerCallbacksManager>,
    callback: Arc<ResourcesPushRpcCallback>,
    servers: Vec<RpcServer>,
}

impl TrunkAgentSkeleton {
    /// Registers `handler` for trunk and sub-port events and subscribes
    /// `host` to both push topics.
    pub async fn start(
        host: impl Into<String>,
        transport: &dyn Transport,
        handler: Arc<dyn TrunkEventHandler>,
    ) -> TrunkResult<Self> {
        let host = host.into();
        let consumers = Arc::new(ConsumerCallbacksManager::new());
        let consumer: Arc<dyn ResourceConsumer> = Arc::new(HandlerConsumer { handler });
        for resource_type in ResourceType::ALL {
            consumers.register(Arc::clone(&consumer), resource_type)?;
        }

        let callback = Arc::new(ResourcesPushRpcCallback::new(Arc::clone(&consumers)));
        let mut servers = Vec::with_capacity(ResourceType::ALL.len());
        for resource_type in ResourceType::ALL {
            let server = callback.subscribe(transport, resource_type, &host).await?;
            debug!(host = %host, resource_type = %resource_type, "Subscribed to pushes");
            servers.push(server);
        }

        info!(host = %host, "Trunk agent skeleton started");
        Ok(Self {
            host,
            consumers,
            callback,
            servers,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn consumers(&self) -> &Arc<ConsumerCallbacksManager> {
        &self.consumers
    }

    pub fn callback(&self) -> &Arc<ResourcesPushRpcCallback> {
        &self.callback
    }

    /// Unsubscribes from all push topics.
    pub fn stop(mut self) {
        for server in self.servers.drain(..) {
            server.stop();
        }
        info!(host = %self.host, "Trunk agent skeleton stopped");
    }
}

/// Handler that only logs what it receives.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl TrunkEventHandler for LoggingEventHandler {
    async fn handle_trunks(&self, _context: &RpcContext, trunks: Vec<Trunk>, event_type: EventType) {
        for trunk in &trunks {
            info!(trunk_id = %trunk.id, parent = %trunk.port_id, event = %event_type, "Trunk event");
        }
    }

    async fn handle_subports(
        &self,
        _context: &RpcContext,
        subports: Vec<SubPort>,
        event_type: EventType,
    ) {
        if subports.is_empty() {
            warn!(event = %event_type, "Empty sub-port event");
        }
        for subport in &subports {
            info!(
                trunk_id = %subport.trunk_id,
                port_id = %subport.port_id,
                segmentation_id = %subport.segmentation_id,
                event = %event_type,
                "Sub-port event"
            );
        }
    }
}

/// Handler that binds pushed sub-ports through the server.
///
/// Newly created sub-ports, and those of newly created trunks that are
/// not yet operational, are bound with
/// [`TrunkRpcApi::update_subport_bindings`]. Every trunk the server
/// reports as updated is then marked `ACTIVE`. Failures are logged; the
/// server keeps the trunk in its previous status.
pub struct SubportBindingHandler {
    api: Arc<dyn TrunkRpcApi>,
}

impl SubportBindingHandler {
    pub fn new(api: Arc<dyn TrunkRpcApi>) -> Self {
        Self { api }
    }

    async fn bind(&self, context: &RpcContext, subports: Vec<SubPort>) {
        if subports.is_empty() {
            return;
        }
        let count = subports.len();
        let updated = match self.api.update_subport_bindings(context, subports).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(count, error = %e, "Failed to bind sub-ports");
                return;
            }
        };

        for (trunk_id, ports) in &updated {
            let status = TrunkStatus::Active.as_str();
            match self
                .api
                .update_trunk_status(context, trunk_id.as_str(), status)
                .await
            {
                Ok(()) => {
                    info!(trunk_id = %trunk_id, ports = ports.len(), "Trunk sub-ports bound");
                }
                Err(e) => {
                    warn!(trunk_id = %trunk_id, error = %e, "Failed to set trunk status");
                }
            }
        }
    }
}

#[async_trait]
impl TrunkEventHandler for SubportBindingHandler {
    async fn handle_trunks(&self, context: &RpcContext, trunks: Vec<Trunk>, event_type: EventType) {
        LoggingEventHandler
            .handle_trunks(context, trunks.clone(), event_type)
            .await;
        if event_type != EventType::Created {
            return;
        }
        let subports = trunks
            .into_iter()
            .filter(|t| !t.status.is_operational())
            .flat_map(|t| t.sub_ports)
            .collect();
        self.bind(context, subports).await;
    }

    async fn handle_subports(
        &self,
        context: &RpcContext,
        subports: Vec<SubPort>,
        event_type: EventType,
    ) {
        LoggingEventHandler
            .handle_subports(context, subports.clone(), event_type)
            .await;
        if event_type == EventType::Created {
            self.bind(context, subports).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCorePlugin, MemoryTrunkStore};
    use crate::server::TrunkService;
    use crate::{CorePlugin, TrunkStore};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::Notify;
    use trunk_rpc::{LocalTransport, ResourcePusher, ResourcesPushRpcApi};
    use trunk_types::{PortBinding, PortUpdate, SegmentationType};

    #[derive(Default)]
    struct Recorder {
        trunks: Mutex<Vec<(EventType, Vec<Trunk>)>>,
        subports: Mutex<Vec<(EventType, Vec<SubPort>)>>,
        notify: Notify,
    }

    #[async_trait]
    impl TrunkEventHandler for Recorder {
        async fn handle_trunks(
            &self,
            _context: &RpcContext,
            trunks: Vec<Trunk>,
            event_type: EventType,
        ) {
            self.trunks.lock().push((event_type, trunks));
            self.notify.notify_one();
        }

        async fn handle_subports(
            &self,
            _context: &RpcContext,
            subports: Vec<SubPort>,
            event_type: EventType,
        ) {
            self.subports.lock().push((event_type, subports));
            self.notify.notify_one();
        }
    }

    async fn wait(recorder: &Recorder) {
        tokio::time::timeout(Duration::from_secs(2), recorder.notify.notified())
            .await
            .expect("push not delivered");
    }

    async fn server(
        transport: &LocalTransport,
    ) -> (TrunkService, Arc<MemoryTrunkStore>, Arc<MemoryCorePlugin>) {
        let store = Arc::new(MemoryTrunkStore::new());
        let plugin = Arc::new(MemoryCorePlugin::new());
        let service = TrunkService::start(
            "controller",
            store.clone(),
            plugin.clone(),
            Arc::new(transport.clone()),
        )
        .await
        .unwrap();
        (service, store, plugin)
    }

    #[tokio::test]
    async fn test_agent_receives_subport_push() {
        let transport = LocalTransport::new();
        let recorder = Arc::new(Recorder::default());
        let agent = TrunkAgentSkeleton::start("compute-1", &transport, recorder.clone())
            .await
            .unwrap();
        assert_eq!(transport.listener_count("resource-push-SubPort-1.0"), 1);

        let pusher = ResourcesPushRpcApi::new(Arc::new(transport.clone()));
        let subports = vec![SubPort::vlan("t1", "p1", 10), SubPort::vlan("t1", "p2", 20)];
        pusher
            .push(
                &RpcContext::admin(),
                subports.iter().cloned().map(Resource::SubPort).collect(),
                EventType::Created,
            )
            .await
            .unwrap();
        wait(&recorder).await;

        assert_eq!(
            *recorder.subports.lock(),
            vec![(EventType::Created, subports)]
        );
        assert!(recorder.trunks.lock().is_empty());

        agent.stop();
        assert_eq!(transport.listener_count("resource-push-SubPort-1.0"), 0);
    }

    #[tokio::test]
    async fn test_client_status_roundtrip() {
        let transport = LocalTransport::new();
        let (_service, store, _plugin) = server(&transport).await;
        let trunk = store
            .create_trunk(&RpcContext::admin(), Trunk::new("tenant", "parent"))
            .await
            .unwrap();

        let client = TrunkServerClient::new(Arc::new(transport.clone()), "controller");
        client
            .update_trunk_status(&RpcContext::new("tenant"), trunk.id.as_str(), "DEGRADED")
            .await
            .unwrap();

        let stored = store.get_trunk(&RpcContext::admin(), trunk.id.as_str()).await.unwrap();
        assert_eq!(stored.status, TrunkStatus::Degraded);
    }

    #[tokio::test]
    async fn test_client_maps_remote_errors() {
        let transport = LocalTransport::new();
        let (_service, store, _plugin) = server(&transport).await;
        let trunk = store
            .create_trunk(&RpcContext::admin(), Trunk::new("tenant", "parent"))
            .await
            .unwrap();
        let client = TrunkServerClient::new(Arc::new(transport.clone()), "controller");

        let err = client
            .update_trunk_status(&RpcContext::admin(), "missing", "ACTIVE")
            .await
            .unwrap_err();
        assert!(matches!(err, TrunkError::NotFound { .. }));

        let err = client
            .update_trunk_status(&RpcContext::admin(), trunk.id.as_str(), "BOGUS")
            .await
            .unwrap_err();
        match err {
            TrunkError::InvalidStatus { status } => assert_eq!(status, "BOGUS"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_client_without_server() {
        let transport = LocalTransport::new();
        let client = TrunkServerClient::new(Arc::new(transport), "controller");
        let err = client
            .update_subport_bindings(&RpcContext::admin(), vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Rpc");
    }

    #[tokio::test]
    async fn test_get_trunk_by_port() {
        let transport = LocalTransport::new();
        let (_service, store, _plugin) = server(&transport).await;
        store.add_segmentation_type(SegmentationType::vlan(), |id| id.is_valid_vlan());

        let mut trunk = Trunk::new("tenant", "parent");
        trunk.sub_ports.push(SubPort::vlan(trunk.id.clone(), "child", 100));
        let trunk = store.create_trunk(&RpcContext::admin(), trunk).await.unwrap();

        let client = TrunkServerClient::new(Arc::new(transport.clone()), "controller");
        let ctx = RpcContext::new("tenant");
        assert_eq!(
            client.get_trunk_by_port(&ctx, "parent").await.unwrap(),
            Some(trunk.clone())
        );
        assert_eq!(
            client.get_trunk_by_port(&ctx, "child").await.unwrap(),
            Some(trunk)
        );
        assert_eq!(client.get_trunk_by_port(&ctx, "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_binding_handler_activates_trunk() {
        let transport = LocalTransport::new();
        let (_service, store, plugin) = server(&transport).await;
        store.add_segmentation_type(SegmentationType::vlan(), |id| id.is_valid_vlan());

        let parent = plugin.create_port("tenant").await;
        let child = plugin.create_port("tenant").await;
        plugin
            .update_port(
                &RpcContext::admin(),
                parent.id.as_str(),
                PortUpdate::new().with_binding(PortBinding::for_host("compute-1")),
            )
            .await
            .unwrap();

        let client = TrunkServerClient::new(Arc::new(transport.clone()), "controller");
        let handler = Arc::new(SubportBindingHandler::new(Arc::new(client)));
        let _agent = TrunkAgentSkeleton::start("compute-1", &transport, handler)
            .await
            .unwrap();

        let mut trunk = Trunk::new("tenant", parent.id.clone());
        trunk.sub_ports.push(SubPort::vlan(trunk.id.clone(), child.id.clone(), 100));
        let trunk = store.create_trunk(&RpcContext::admin(), trunk).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let stored = store.get_trunk(&RpcContext::admin(), trunk.id.as_str()).await.unwrap();
                if stored.status == TrunkStatus::Active {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("trunk not activated");

        let bound = plugin.get_port(&RpcContext::admin(), child.id.as_str()).await.unwrap();
        assert_eq!(bound.host_id(), Some("compute-1"));
    }

    #[tokio::test]
    async fn test_binding_handler_leaves_unbound_trunk_pending() {
        let transport = LocalTransport::new();
        let (_service, store, plugin) = server(&transport).await;
        store.add_segmentation_type(SegmentationType::vlan(), |id| id.is_valid_vlan());
        let parent = plugin.create_port("tenant").await;
        let child = plugin.create_port("tenant").await;
        let mut trunk = Trunk::new("tenant", parent.id.clone());
        trunk.sub_ports.push(SubPort::vlan(trunk.id.clone(), child.id.clone(), 100));
        let trunk = store.create_trunk(&RpcContext::admin(), trunk).await.unwrap();

        let client = TrunkServerClient::new(Arc::new(transport.clone()), "controller");
        let handler = SubportBindingHandler::new(Arc::new(client));
        handler
            .handle_trunks(&RpcContext::admin(), vec![trunk.clone()], EventType::Created)
            .await;

        let stored = store.get_trunk(&RpcContext::admin(), trunk.id.as_str()).await.unwrap();
        assert_eq!(stored.status, TrunkStatus::Pending);
        let port = plugin.get_port(&RpcContext::admin(), child.id.as_str()).await.unwrap();
        assert_eq!(port.host_id(), None);
    }
}
