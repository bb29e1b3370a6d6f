//! In-memory trunk store and core plugin.
//!
//! These back the daemon when it runs standalone and the integration
//! tests. Records live in `tokio::sync::RwLock`-protected maps; each
//! method takes the lock once, so every call is atomic with respect to
//! the others. Lifecycle hooks run after the lock is released.

use crate::{CorePlugin, HooksId, TrunkError, TrunkLifecycleHooks, TrunkResult, TrunkStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use trunk_rpc::RpcContext;
use trunk_types::{
    Port, PortId, PortUpdate, SegmentationId, SegmentationType, SubPort, Trunk, TrunkId,
    TrunkStatus,
};

/// Predicate deciding whether a segmentation id is valid for its type.
pub type SegmentationValidator = Arc<dyn Fn(SegmentationId) -> bool + Send + Sync>;

#[derive(Default)]
struct StoreState {
    trunks: BTreeMap<TrunkId, Trunk>,
}

impl StoreState {
    /// Returns the trunk using the port as parent or sub-port.
    fn port_owner(&self, port_id: &str) -> Option<&TrunkId> {
        self.trunks
            .values()
            .find(|t| t.uses_port(port_id))
            .map(|t| &t.id)
    }

    fn trunk_mut(&mut self, trunk_id: &str) -> TrunkResult<&mut Trunk> {
        self.trunks
            .get_mut(trunk_id)
            .ok_or_else(|| TrunkError::trunk_not_found(trunk_id))
    }

    /// Checks that `subports` can join `trunk`.
    fn check_subports(&self, trunk: &Trunk, subports: &[SubPort]) -> TrunkResult<()> {
        let mut ports = HashSet::new();
        let mut tags = HashSet::new();

        for subport in subports {
            let port_id = subport.port_id.as_str();
            if port_id == trunk.port_id.as_str() {
                return Err(TrunkError::conflict(format!(
                    "port {} is the parent of trunk {}",
                    port_id, trunk.id
                )));
            }
            if let Some(owner) = self.port_owner(port_id) {
                return Err(TrunkError::conflict(format!(
                    "port {} is in use by trunk {}",
                    port_id, owner
                )));
            }
            if !ports.insert(port_id) {
                return Err(TrunkError::conflict(format!(
                    "port {} is listed more than once",
                    port_id
                )));
            }

            let tag = (&subport.segmentation_type, subport.segmentation_id);
            if trunk
                .subport_by_segmentation(&subport.segmentation_type, subport.segmentation_id)
                .is_some()
                || !tags.insert(tag)
            {
                return Err(TrunkError::conflict(format!(
                    "segmentation {}/{} is already used in trunk {}",
                    subport.segmentation_type, subport.segmentation_id, trunk.id
                )));
            }
        }
        Ok(())
    }
}

/// In-memory [`TrunkStore`].
#[derive(Default)]
pub struct MemoryTrunkStore {
    state: RwLock<StoreState>,
    validators: parking_lot::RwLock<HashMap<SegmentationType, SegmentationValidator>>,
    hooks: parking_lot::RwLock<Vec<(HooksId, Arc<dyn TrunkLifecycleHooks>)>>,
    next_hooks_id: AtomicU64,
}

impl MemoryTrunkStore {
    /// Creates an empty store accepting no segmentation type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts sub-ports of `segmentation_type` whose id passes `validator`.
    pub fn add_segmentation_type(
        &self,
        segmentation_type: SegmentationType,
        validator: impl Fn(SegmentationId) -> bool + Send + Sync + 'static,
    ) {
        info!(segmentation_type = %segmentation_type, "Segmentation type enabled");
        self.validators
            .write()
            .insert(segmentation_type, Arc::new(validator));
    }

    /// Returns the accepted segmentation types, sorted.
    pub fn segmentation_types(&self) -> Vec<SegmentationType> {
        let mut types: Vec<_> = self.validators.read().keys().cloned().collect();
        types.sort();
        types
    }

    fn validate_segmentation(&self, subports: &[SubPort]) -> TrunkResult<()> {
        let validators = self.validators.read();
        for subport in subports {
            let validator = validators.get(&subport.segmentation_type).ok_or_else(|| {
                TrunkError::invalid_segmentation(format!(
                    "segmentation type '{}' is not supported",
                    subport.segmentation_type
                ))
            })?;
            if !validator(subport.segmentation_id) {
                return Err(TrunkError::invalid_segmentation(format!(
                    "segmentation id {} is not valid for '{}'",
                    subport.segmentation_id, subport.segmentation_type
                )));
            }
        }
        Ok(())
    }

    fn hooks(&self) -> Vec<Arc<dyn TrunkLifecycleHooks>> {
        self.hooks.read().iter().map(|(_, h)| Arc::clone(h)).collect()
    }
}

fn stamp_trunk_id(trunk_id: &TrunkId, subports: &mut [SubPort]) {
    for subport in subports {
        subport.trunk_id = trunk_id.clone();
    }
}

#[async_trait]
impl TrunkStore for MemoryTrunkStore {
    #[instrument(skip(self, context, trunk), fields(trunk_id = %trunk.id, port_id = %trunk.port_id))]
    async fn create_trunk(&self, context: &RpcContext, mut trunk: Trunk) -> TrunkResult<Trunk> {
        let mut subports = std::mem::take(&mut trunk.sub_ports);
        stamp_trunk_id(&trunk.id, &mut subports);
        self.validate_segmentation(&subports)?;

        {
            let mut state = self.state.write().await;
            if state.trunks.contains_key(&trunk.id) {
                return Err(TrunkError::conflict(format!("trunk {} already exists", trunk.id)));
            }
            if let Some(owner) = state.port_owner(trunk.port_id.as_str()) {
                return Err(TrunkError::conflict(format!(
                    "port {} is in use by trunk {}",
                    trunk.port_id, owner
                )));
            }
            state.check_subports(&trunk, &subports)?;

            trunk.status = TrunkStatus::INITIAL;
            trunk.sub_ports = subports;
            state.trunks.insert(trunk.id.clone(), trunk.clone());
        }
        info!(subports = trunk.sub_ports.len(), "Trunk created");

        for hooks in self.hooks() {
            hooks.on_trunk_created(context, &trunk).await;
        }
        Ok(trunk)
    }

    async fn get_trunk(&self, _context: &RpcContext, trunk_id: &str) -> TrunkResult<Trunk> {
        self.state
            .read()
            .await
            .trunks
            .get(trunk_id)
            .cloned()
            .ok_or_else(|| TrunkError::trunk_not_found(trunk_id))
    }

    async fn list_trunks(&self, _context: &RpcContext) -> TrunkResult<Vec<Trunk>> {
        Ok(self.state.read().await.trunks.values().cloned().collect())
    }

    async fn find_trunk_by_parent(
        &self,
        _context: &RpcContext,
        port_id: &str,
    ) -> TrunkResult<Option<Trunk>> {
        Ok(self
            .state
            .read()
            .await
            .trunks
            .values()
            .find(|t| t.port_id.as_str() == port_id)
            .cloned())
    }

    async fn find_trunk_by_subport(
        &self,
        _context: &RpcContext,
        port_id: &str,
    ) -> TrunkResult<Option<Trunk>> {
        Ok(self
            .state
            .read()
            .await
            .trunks
            .values()
            .find(|t| t.subport(port_id).is_some())
            .cloned())
    }

    async fn update_trunk_status(
        &self,
        _context: &RpcContext,
        trunk_id: &str,
        status: TrunkStatus,
    ) -> TrunkResult<Trunk> {
        let mut state = self.state.write().await;
        let trunk = state.trunk_mut(trunk_id)?;
        if trunk.status != status {
            debug!(trunk_id, from = %trunk.status, to = %status, "Trunk status changed");
        }
        trunk.status = status;
        Ok(trunk.clone())
    }

    #[instrument(skip(self, context))]
    async fn delete_trunk(&self, context: &RpcContext, trunk_id: &str) -> TrunkResult<Trunk> {
        let trunk = self
            .state
            .write()
            .await
            .trunks
            .remove(trunk_id)
            .ok_or_else(|| TrunkError::trunk_not_found(trunk_id))?;
        info!("Trunk deleted");

        for hooks in self.hooks() {
            hooks.on_trunk_deleted(context, &trunk).await;
        }
        Ok(trunk)
    }

    #[instrument(skip(self, context, subports), fields(count = subports.len()))]
    async fn add_subports(
        &self,
        context: &RpcContext,
        trunk_id: &str,
        mut subports: Vec<SubPort>,
    ) -> TrunkResult<Trunk> {
        self.validate_segmentation(&subports)?;

        let trunk = {
            let mut state = self.state.write().await;
            let current = state
                .trunks
                .get(trunk_id)
                .ok_or_else(|| TrunkError::trunk_not_found(trunk_id))?;
            stamp_trunk_id(&current.id, &mut subports);
            state.check_subports(current, &subports)?;

            let trunk = state.trunk_mut(trunk_id)?;
            trunk.sub_ports.extend(subports.iter().cloned());
            trunk.clone()
        };

        if !subports.is_empty() {
            info!("Sub-ports added");
            for hooks in self.hooks() {
                hooks.on_subports_added(context, &subports).await;
            }
        }
        Ok(trunk)
    }

    #[instrument(skip(self, context, port_ids), fields(count = port_ids.len()))]
    async fn remove_subports(
        &self,
        context: &RpcContext,
        trunk_id: &str,
        port_ids: &[PortId],
    ) -> TrunkResult<Trunk> {
        let (trunk, removed) = {
            let mut state = self.state.write().await;
            let trunk = state.trunk_mut(trunk_id)?;
            if let Some(missing) = port_ids.iter().find(|p| trunk.subport(p.as_str()).is_none()) {
                return Err(TrunkError::NotFound {
                    message: format!("sub-port {} in trunk {}", missing, trunk_id),
                });
            }

            let mut seen = HashSet::new();
            if let Some(duplicate) = port_ids.iter().find(|p| !seen.insert(p.as_str())) {
                return Err(TrunkError::conflict(format!(
                    "port {} is listed more than once",
                    duplicate
                )));
            }

            let removed: Vec<SubPort> = port_ids
                .iter()
                .filter_map(|p| trunk.subport(p.as_str()).cloned())
                .collect();
            trunk.sub_ports.retain(|s| !port_ids.contains(&s.port_id));
            (trunk.clone(), removed)
        };

        if !removed.is_empty() {
            info!("Sub-ports removed");
            for hooks in self.hooks() {
                hooks.on_subports_deleted(context, &removed).await;
            }
        }
        Ok(trunk)
    }

    fn register_hooks(&self, hooks: Arc<dyn TrunkLifecycleHooks>) -> HooksId {
        let id = HooksId::new(self.next_hooks_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push((id, hooks));
        debug!(hooks_id = id.get(), "Lifecycle hooks registered");
        id
    }

    fn unregister_hooks(&self, id: HooksId) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|(registered, _)| *registered != id);
        let removed = hooks.len() != before;
        if removed {
            debug!(hooks_id = id.get(), "Lifecycle hooks unregistered");
        }
        removed
    }
}

/// In-memory [`CorePlugin`].
#[derive(Default)]
pub struct MemoryCorePlugin {
    ports: RwLock<HashMap<PortId, Port>>,
}

impl MemoryCorePlugin {
    /// Creates a plugin with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a port, replacing any port with the same id.
    pub async fn insert_port(&self, port: Port) {
        self.ports.write().await.insert(port.id.clone(), port);
    }

    /// Creates an unbound port with a fresh id.
    pub async fn create_port(&self, tenant_id: &str) -> Port {
        let port = Port::new(PortId::generate(), tenant_id);
        self.insert_port(port.clone()).await;
        port
    }
}

#[async_trait]
impl CorePlugin for MemoryCorePlugin {
    async fn get_port(&self, _context: &RpcContext, port_id: &str) -> TrunkResult<Port> {
        self.ports
            .read()
            .await
            .get(port_id)
            .cloned()
            .ok_or_else(|| TrunkError::port_not_found(port_id))
    }

    async fn update_port(
        &self,
        _context: &RpcContext,
        port_id: &str,
        update: PortUpdate,
    ) -> TrunkResult<Port> {
        let mut ports = self.ports.write().await;
        let port = ports
            .get_mut(port_id)
            .ok_or_else(|| TrunkError::port_not_found(port_id))?;
        port.apply(&update);
        debug!(port_id, host = ?port.host_id(), "Port updated");
        Ok(port.clone())
    }
}
