//! Collaborator interfaces of the trunk service.
//!
//! The trunk records and the port records are owned by other components.
//! The service reaches them only through these traits:
//!
//! - [`TrunkStore`]: CRUD and status mutation over trunks and sub-ports
//! - [`CorePlugin`]: Port lookup and partial port update
//! - [`TrunkLifecycleHooks`]: Notifications emitted by the store after a
//!   committed mutation

use crate::TrunkResult;
use async_trait::async_trait;
use std::sync::Arc;
use trunk_rpc::RpcContext;
use trunk_types::{Port, PortId, PortUpdate, SubPort, Trunk, TrunkStatus};

/// Storage of trunk aggregates.
///
/// Implementations own row atomicity: every method is a single unit of
/// work and callers hold no lock across calls.
#[async_trait]
pub trait TrunkStore: Send + Sync {
    /// Creates a trunk with its initial sub-ports.
    ///
    /// The stored trunk always starts in [`TrunkStatus::INITIAL`].
    async fn create_trunk(&self, context: &RpcContext, trunk: Trunk) -> TrunkResult<Trunk>;

    /// Returns a trunk, or `NotFound`.
    async fn get_trunk(&self, context: &RpcContext, trunk_id: &str) -> TrunkResult<Trunk>;

    /// Returns all trunks.
    async fn list_trunks(&self, context: &RpcContext) -> TrunkResult<Vec<Trunk>>;

    /// Returns the trunk whose parent port is `port_id`.
    async fn find_trunk_by_parent(
        &self,
        context: &RpcContext,
        port_id: &str,
    ) -> TrunkResult<Option<Trunk>>;

    /// Returns the trunk enrolling `port_id` as a sub-port.
    async fn find_trunk_by_subport(
        &self,
        context: &RpcContext,
        port_id: &str,
    ) -> TrunkResult<Option<Trunk>>;

    /// Persists a new status verbatim.
    async fn update_trunk_status(
        &self,
        context: &RpcContext,
        trunk_id: &str,
        status: TrunkStatus,
    ) -> TrunkResult<Trunk>;

    /// Deletes a trunk and returns it as it was.
    async fn delete_trunk(&self, context: &RpcContext, trunk_id: &str) -> TrunkResult<Trunk>;

    /// Enrolls sub-ports in a trunk.
    async fn add_subports(
        &self,
        context: &RpcContext,
        trunk_id: &str,
        subports: Vec<SubPort>,
    ) -> TrunkResult<Trunk>;

    /// Removes sub-ports from a trunk.
    async fn remove_subports(
        &self,
        context: &RpcContext,
        trunk_id: &str,
        port_ids: &[PortId],
    ) -> TrunkResult<Trunk>;

    /// Adds a receiver of lifecycle notifications.
    fn register_hooks(&self, hooks: Arc<dyn TrunkLifecycleHooks>) -> HooksId;

    /// Removes a receiver added by [`register_hooks`](Self::register_hooks).
    ///
    /// Returns false if `id` is not registered.
    fn unregister_hooks(&self, id: HooksId) -> bool;
}

/// Registration handle returned by [`TrunkStore::register_hooks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HooksId(u64);

impl HooksId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Port operations of the core networking plugin.
#[async_trait]
pub trait CorePlugin: Send + Sync {
    /// Returns a port, or `NotFound`.
    async fn get_port(&self, context: &RpcContext, port_id: &str) -> TrunkResult<Port>;

    /// Applies a partial update and returns the updated port.
    async fn update_port(
        &self,
        context: &RpcContext,
        port_id: &str,
        update: PortUpdate,
    ) -> TrunkResult<Port>;
}

/// Receiver of trunk lifecycle notifications.
///
/// Called after the mutation is committed; a hook cannot veto it.
#[async_trait]
pub trait TrunkLifecycleHooks: Send + Sync {
    async fn on_trunk_created(&self, context: &RpcContext, trunk: &Trunk);

    async fn on_trunk_deleted(&self, context: &RpcContext, trunk: &Trunk);

    async fn on_subports_added(&self, context: &RpcContext, subports: &[SubPort]);

    async fn on_subports_deleted(&self, context: &RpcContext, subports: &[SubPort]);
}
