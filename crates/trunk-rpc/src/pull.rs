//! On-demand resource pull channel.

use crate::{
    version_is_compatible, MethodTable, Resource, ResourceCallbacksManager, ResourceType,
    RpcContext, RpcEndpoint, RpcError, RpcResult, RpcServer, Target, Transport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Topic served by the pull endpoint.
pub const RESOURCES_PULL_TOPIC: &str = "resources-pull";

/// Wire method of the pull channel.
pub const PULL_METHOD: &str = "pull";

/// Arguments of a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub resource_type: ResourceType,
    pub version: String,
    pub resource_id: String,
}

/// Agent-side pull client.
pub struct ResourcesPullRpcApi {
    transport: Arc<dyn Transport>,
}

impl ResourcesPullRpcApi {
    /// Creates a pull client on a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetches one resource from the server.
    ///
    /// Returns `Ok(None)` if the server has no such resource.
    pub async fn pull(
        &self,
        context: &RpcContext,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> RpcResult<Option<Resource>> {
        let request = PullRequest {
            resource_type,
            version: resource_type.version().to_string(),
            resource_id: resource_id.to_string(),
        };
        let args = serde_json::to_value(&request).map_err(|e| RpcError::encode("pull request", e))?;
        let reply = self
            .transport
            .call(&Target::new(RESOURCES_PULL_TOPIC), context, PULL_METHOD, args)
            .await?;

        let resource: Option<Resource> =
            serde_json::from_value(reply).map_err(|e| RpcError::decode("pull reply", e))?;
        match resource {
            Some(resource) if resource.resource_type() != resource_type => Err(RpcError::decode(
                "pull reply",
                format!("expected {}, got {}", resource_type, resource.resource_type()),
            )),
            other => Ok(other),
        }
    }
}

/// Server-side endpoint answering pulls from the provider registry.
pub struct ResourcesPullRpcCallback {
    providers: Arc<ResourceCallbacksManager>,
}

impl ResourcesPullRpcCallback {
    /// Endpoint name.
    pub const NAME: &'static str = "ResourcesPullRpcCallback";

    /// Endpoint version.
    pub const VERSION: &'static str = "1.0";

    /// Creates a callback backed by `providers`.
    pub fn new(providers: Arc<ResourceCallbacksManager>) -> Self {
        Self { providers }
    }

    /// Builds the RPC endpoint.
    pub fn endpoint(self: &Arc<Self>) -> Arc<dyn RpcEndpoint> {
        let endpoint = MethodTable::new(Self::NAME, Self::VERSION)
            .method(
                PULL_METHOD,
                |callback: Arc<Self>, context: RpcContext, request: PullRequest| async move {
                    callback.handle_pull(&context, request).await
                },
            )
            .bind(Arc::clone(self));
        Arc::new(endpoint)
    }

    /// Serves the pull topic.
    pub async fn serve(self: &Arc<Self>, transport: &dyn Transport) -> RpcResult<RpcServer> {
        transport
            .serve(Target::new(RESOURCES_PULL_TOPIC), vec![self.endpoint()])
            .await
    }

    /// Answers one pull.
    pub async fn handle_pull(
        &self,
        context: &RpcContext,
        request: PullRequest,
    ) -> RpcResult<Option<Resource>> {
        let available = request.resource_type.version();
        if !version_is_compatible(available, &request.version) {
            return Err(RpcError::IncompatibleVersion {
                endpoint: request.resource_type.to_string(),
                requested: request.version,
                available: available.to_string(),
            });
        }

        debug!(
            resource_type = %request.resource_type,
            resource_id = %request.resource_id,
            "Pull requested"
        );
        let resource = self
            .providers
            .pull(context, request.resource_type, &request.resource_id)
            .await?;
        Ok(resource)
    }
}
