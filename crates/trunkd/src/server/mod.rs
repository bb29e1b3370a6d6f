//! Server side of trunk synchronization.
//!
//! [`TrunkService`] wires the pieces together on one transport:
//!
//! - [`TrunkSkeleton`] answers agent calls on the `trunk` topic
//! - the pull endpoint answers trunk lookups through [`TrunkByPortProvider`]
//! - [`TrunkStub`] is registered as store hooks and pushes lifecycle events

mod skeleton;
mod stub;

pub use skeleton::{
    TrunkByPortProvider, TrunkRpcApi, TrunkSkeleton, UpdateSubportBindingsArgs,
    UpdateTrunkStatusArgs,
};
pub use stub::TrunkStub;

use crate::{
    audit_log,
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    CorePlugin, HooksId, TrunkLifecycleHooks, TrunkResult, TrunkStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use trunk_rpc::{
    ResourceCallbacksManager, ResourcesPullRpcCallback, ResourcesPushRpcApi, RpcServer,
    Transport,
};

/// A running trunk server.
///
/// Stopping or dropping the service stops its listeners and removes the
/// stub from the store's hooks.
pub struct TrunkService {
    host: String,
    store: Arc<dyn TrunkStore>,
    skeleton: Arc<TrunkSkeleton>,
    stub: Arc<TrunkStub>,
    producers: Arc<ResourceCallbacksManager>,
    servers: Vec<RpcServer>,
    hooks_id: Option<HooksId>,
}

impl TrunkService {
    /// Starts serving on `host`.
    pub async fn start(
        host: impl Into<String>,
        store: Arc<dyn TrunkStore>,
        core_plugin: Arc<dyn CorePlugin>,
        transport: Arc<dyn Transport>,
    ) -> TrunkResult<Self> {
        let host = host.into();
        let producers = Arc::new(ResourceCallbacksManager::new());

        let skeleton = Arc::new(TrunkSkeleton::new(Arc::clone(&store), core_plugin));
        let skeleton_server = skeleton
            .start(&producers, transport.as_ref(), &host)
            .await?;

        let pull = Arc::new(ResourcesPullRpcCallback::new(Arc::clone(&producers)));
        let pull_server = pull.serve(transport.as_ref()).await?;

        let stub = Arc::new(TrunkStub::new(Arc::new(ResourcesPushRpcApi::new(
            Arc::clone(&transport),
        ))));
        let hooks: Arc<dyn TrunkLifecycleHooks> = Arc::clone(&stub) as _;
        let hooks_id = store.register_hooks(hooks);

        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "TrunkService", "start")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(host.clone())
            .with_object_type("host"));
        info!(host = %host, "Trunk service started");

        Ok(Self {
            host,
            store,
            skeleton,
            stub,
            producers,
            servers: vec![skeleton_server, pull_server],
            hooks_id: Some(hooks_id),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn skeleton(&self) -> &Arc<TrunkSkeleton> {
        &self.skeleton
    }

    pub fn stub(&self) -> &Arc<TrunkStub> {
        &self.stub
    }

    /// Provider registry answering pulls.
    pub fn producers(&self) -> &Arc<ResourceCallbacksManager> {
        &self.producers
    }

    /// Stops all listeners and unregisters the stub.
    pub fn stop(mut self) {
        self.shutdown();
        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "TrunkService", "stop")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(self.host.clone())
            .with_object_type("host"));
        info!(host = %self.host, "Trunk service stopped");
    }

    fn shutdown(&mut self) {
        for server in self.servers.drain(..) {
            server.stop();
        }
        if let Some(id) = self.hooks_id.take() {
            if !self.store.unregister_hooks(id) {
                warn!(host = %self.host, hooks_id = id.get(), "Trunk stub was not registered");
            }
        }
    }
}

impl Drop for TrunkService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
