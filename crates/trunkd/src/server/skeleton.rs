//! Server-side RPC endpoint for trunk agents.

use crate::constants::{methods, TRUNK_API_VERSION, TRUNK_BASE_TOPIC};
use crate::{
    audit_log,
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    CorePlugin, TrunkError, TrunkResult, TrunkStore,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use trunk_rpc::{
    CallbackError, MethodTable, Resource, ResourceCallbacksManager, ResourceProvider,
    ResourceType, RpcContext, RpcEndpoint, RpcServer, Target, Transport,
};
use trunk_types::{Port, PortUpdate, SubPort, TrunkId, TrunkStatus, TRUNK_SUBPORT_OWNER};

/// Operations the trunk server exposes to agents.
#[async_trait]
pub trait TrunkRpcApi: Send + Sync {
    /// Makes every listed sub-port follow the binding of its trunk's parent
    /// port.
    ///
    /// Returns the updated ports keyed by trunk. Trunks that cannot be
    /// processed are left out; the call itself only fails on transport
    /// errors.
    async fn update_subport_bindings(
        &self,
        context: &RpcContext,
        subports: Vec<SubPort>,
    ) -> TrunkResult<BTreeMap<TrunkId, Vec<Port>>>;

    /// Sets the status of a trunk.
    ///
    /// `status` must be one of the recognized wire names; it is checked
    /// before the trunk is looked up.
    async fn update_trunk_status(
        &self,
        context: &RpcContext,
        trunk_id: &str,
        status: &str,
    ) -> TrunkResult<()>;
}

/// Arguments of `update_subport_bindings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSubportBindingsArgs {
    pub subports: Vec<SubPort>,
}

/// Arguments of `update_trunk_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTrunkStatusArgs {
    pub trunk_id: String,
    pub status: String,
}

/// Groups sub-ports by trunk, keeping first-seen trunk order and the call
/// order within each trunk.
fn group_by_trunk(subports: Vec<SubPort>) -> Vec<(TrunkId, Vec<SubPort>)> {
    let mut groups: Vec<(TrunkId, Vec<SubPort>)> = Vec::new();
    for subport in subports {
        match groups.iter_mut().find(|(id, _)| *id == subport.trunk_id) {
            Some((_, group)) => group.push(subport),
            None => groups.push((subport.trunk_id.clone(), vec![subport])),
        }
    }
    groups
}

/// Resolves the trunk that uses a port, as parent first, then as sub-port.
pub struct TrunkByPortProvider {
    store: Arc<dyn TrunkStore>,
}

impl TrunkByPortProvider {
    pub fn new(store: Arc<dyn TrunkStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceProvider for TrunkByPortProvider {
    async fn provide(
        &self,
        context: &RpcContext,
        resource_id: &str,
    ) -> Result<Option<Resource>, CallbackError> {
        let context = context.elevated();
        let to_callback_error =
            |e: TrunkError| CallbackError::provider(ResourceType::Trunk, e.to_string());

        let trunk = match self
            .store
            .find_trunk_by_parent(&context, resource_id)
            .await
            .map_err(to_callback_error)?
        {
            Some(trunk) => Some(trunk),
            None => self
                .store
                .find_trunk_by_subport(&context, resource_id)
                .await
                .map_err(to_callback_error)?,
        };
        Ok(trunk.map(Resource::Trunk))
    }
}

/// Server endpoint answering agent calls.
pub struct TrunkSkeleton {
    store: Arc<dyn TrunkStore>,
    core_plugin: Arc<dyn CorePlugin>,
}

impl TrunkSkeleton {
    /// Endpoint name.
    pub const NAME: &'static str = "TrunkSkeleton";

    pub fn new(store: Arc<dyn TrunkStore>, core_plugin: Arc<dyn CorePlugin>) -> Self {
        Self { store, core_plugin }
    }

    /// Returns the method table of the endpoint.
    pub fn method_table() -> MethodTable<Self> {
        MethodTable::new(Self::NAME, TRUNK_API_VERSION)
            .method(
                methods::UPDATE_SUBPORT_BINDINGS,
                |skeleton: Arc<Self>, context: RpcContext, args: UpdateSubportBindingsArgs| async move {
                    skeleton.update_subport_bindings(&context, args.subports).await
                },
            )
            .method(
                methods::UPDATE_TRUNK_STATUS,
                |skeleton: Arc<Self>, context: RpcContext, args: UpdateTrunkStatusArgs| async move {
                    skeleton
                        .update_trunk_status(&context, &args.trunk_id, &args.status)
                        .await
                },
            )
    }

    /// Builds the RPC endpoint bound to this skeleton.
    pub fn endpoint(self: &Arc<Self>) -> Arc<dyn RpcEndpoint> {
        Arc::new(Self::method_table().bind(Arc::clone(self)))
    }

    /// Registers the trunk provider and starts serving agent calls on
    /// `host`.
    ///
    /// Fails if a trunk provider is already registered or another server
    /// already listens for `host`.
    pub async fn start(
        self: &Arc<Self>,
        producers: &ResourceCallbacksManager,
        transport: &dyn Transport,
        host: &str,
    ) -> TrunkResult<RpcServer> {
        producers.register(
            Arc::new(TrunkByPortProvider::new(Arc::clone(&self.store))),
            ResourceType::Trunk,
        )?;

        let target = Target::new(TRUNK_BASE_TOPIC).with_server(host);
        match transport.serve(target, vec![self.endpoint()]).await {
            Ok(server) => {
                info!(host, "Trunk skeleton serving");
                Ok(server)
            }
            Err(e) => {
                // Registration is undone when serving fails
                if let Err(rollback) = producers.unregister(ResourceType::Trunk) {
                    warn!(host, error = %rollback, "Failed to unregister trunk provider");
                }
                Err(e.into())
            }
        }
    }

    /// Applies the parent binding of one trunk to its listed sub-ports.
    async fn bind_trunk_subports(
        &self,
        context: &RpcContext,
        trunk_id: &TrunkId,
        subports: &[SubPort],
    ) -> TrunkResult<Vec<Port>> {
        let trunk = self.store.get_trunk(context, trunk_id.as_str()).await?;
        let parent = self.core_plugin.get_port(context, trunk.port_id.as_str()).await?;
        if !parent.binding.is_bound() {
            return Err(TrunkError::binding_unavailable(format!(
                "parent port {} of trunk {} is not bound to a host",
                parent.id, trunk_id
            )));
        }

        let update = PortUpdate::new()
            .with_binding(parent.binding.clone())
            .with_device_owner(TRUNK_SUBPORT_OWNER);

        let mut ports = Vec::with_capacity(subports.len());
        for subport in subports {
            match self
                .core_plugin
                .update_port(context, subport.port_id.as_str(), update.clone())
                .await
            {
                Ok(port) => ports.push(port),
                Err(e) => warn!(
                    trunk_id = %trunk_id,
                    port_id = %subport.port_id,
                    error = %e,
                    "Failed to update sub-port binding"
                ),
            }
        }
        debug!(
            trunk_id = %trunk_id,
            host = parent.binding.host_id.as_str(),
            updated = ports.len(),
            "Sub-port bindings updated"
        );
        Ok(ports)
    }
}

#[async_trait]
impl TrunkRpcApi for TrunkSkeleton {
    #[instrument(skip(self, context, subports), fields(count = subports.len()))]
    async fn update_subport_bindings(
        &self,
        context: &RpcContext,
        subports: Vec<SubPort>,
    ) -> TrunkResult<BTreeMap<TrunkId, Vec<Port>>> {
        let context = context.elevated();
        let mut updated = BTreeMap::new();

        for (trunk_id, group) in group_by_trunk(subports) {
            match self.bind_trunk_subports(&context, &trunk_id, &group).await {
                Ok(ports) => {
                    updated.insert(trunk_id, ports);
                }
                Err(e) => warn!(
                    trunk_id = %trunk_id,
                    subports = group.len(),
                    error = %e,
                    "Skipping sub-port bindings of trunk"
                ),
            }
        }
        Ok(updated)
    }

    #[instrument(skip(self, context))]
    async fn update_trunk_status(
        &self,
        context: &RpcContext,
        trunk_id: &str,
        status: &str,
    ) -> TrunkResult<()> {
        let record = AuditRecord::new(
            AuditCategory::ResourceModify,
            Self::NAME,
            "update_trunk_status",
        )
        .with_object_id(trunk_id)
        .with_object_type("trunk")
        .with_correlation_id(context.request_id.clone())
        .with_details(serde_json::json!({ "status": status }));

        let result = match status.parse::<TrunkStatus>() {
            Ok(status) => self
                .store
                .update_trunk_status(&context.elevated(), trunk_id, status)
                .await
                .map(|_| ()),
            Err(_) => Err(TrunkError::invalid_status(status)),
        };

        match &result {
            Ok(()) => {
                audit_log!(record.with_outcome(AuditOutcome::Success));
            }
            Err(e) => {
                audit_log!(record.with_error(e.to_string()));
            }
        }
        result
    }
}
