//! RPC abstractions for trunk synchronization.
//!
//! This crate provides the pieces shared by the trunk server and the host
//! agents:
//!
//! - [`Transport`]: Seam over the messaging substrate (call/cast/serve)
//! - [`LocalTransport`]: In-process transport used by the daemon and tests
//! - [`RpcEndpoint`] / [`MethodTable`]: Explicit method-name dispatch
//! - [`ResourceCallbacksManager`]: Resource providers, one per resource type
//! - [`ResourcesPushRpcApi`] / [`ResourcesPushRpcCallback`]: Versioned fanout
//!   of CREATED/UPDATED/DELETED events
//! - [`ResourcesPullRpcApi`] / [`ResourcesPullRpcCallback`]: On-demand
//!   resource lookup backed by the provider registry
//!
//! # Architecture
//!
//! ```text
//! agent ──call──> Target{topic, server} ──> RpcEndpoint (MethodTable)
//!
//! server ──push──> Target{resource-push-<Type>-<ver>, fanout}
//!                       ├──> agent A: ResourcesPushRpcCallback ──> consumers
//!                       └──> agent B: ResourcesPushRpcCallback ──> consumers
//! ```
//!
//! # Example
//!
//! ```ignore
//! use trunk_rpc::{MethodTable, RpcContext};
//!
//! let endpoint = MethodTable::new("Echo", "1.0")
//!     .method("echo", |svc: Arc<Echo>, _ctx: RpcContext, msg: String| async move {
//!         Ok::<_, RpcError>(msg)
//!     })
//!     .bind(Arc::new(Echo));
//! let _server = transport.serve(Target::new("echo"), vec![Arc::new(endpoint)]).await?;
//! ```

mod callbacks;
mod context;
mod endpoint;
mod error;
mod pull;
mod push;
mod resources;
mod target;
mod transport;

pub use callbacks::{
    CallbackError, ConsumerCallbacksManager, ResourceCallbacksManager, ResourceConsumer,
    ResourceProvider,
};
pub use context::RpcContext;
pub use endpoint::{BoundEndpoint, MethodFuture, MethodTable, RpcEndpoint};
pub use error::{RemoteError, RpcError, RpcResult};
pub use pull::{
    PullRequest, ResourcesPullRpcApi, ResourcesPullRpcCallback, PULL_METHOD, RESOURCES_PULL_TOPIC,
};
pub use push::{
    validate_resources, PushError, PushPayload, ResourcePusher, ResourcesPushRpcApi,
    ResourcesPushRpcCallback, PUSH_METHOD,
};
pub use resources::{
    resource_type_versioned_topic, EventType, Resource, ResourceType, RESOURCE_TOPIC_PREFIX,
};
pub use target::{version_is_compatible, Target};
pub use transport::{LocalTransport, RpcServer, Transport};
