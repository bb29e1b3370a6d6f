//! Resource callback registries.
//!
//! The producer side keeps exactly one [`ResourceProvider`] per resource
//! type; it answers pulls. The consumer side keeps any number of
//! [`ResourceConsumer`]s per type; they receive pushed events. Both
//! registries are plain objects owned by whoever wires the service, so
//! tests can build as many independent instances as they need.

use crate::{EventType, RemoteError, Resource, ResourceType, RpcContext, RpcError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// A provider is already registered for the type
    #[error("A provider is already registered for {0}")]
    AlreadyRegistered(ResourceType),

    /// No provider is registered for the type
    #[error("No provider is registered for {0}")]
    NotRegistered(ResourceType),

    /// The same consumer instance is already registered for the type
    #[error("Consumer is already registered for {0}")]
    DuplicateConsumer(ResourceType),

    /// The resource type name is not known
    #[error("Unknown resource type '{0}'")]
    UnknownResourceType(String),

    /// The provider failed to produce the resource
    #[error("Provider for {resource_type} failed: {message}")]
    Provider {
        resource_type: ResourceType,
        message: String,
    },
}

impl CallbackError {
    /// Creates a provider failure.
    pub fn provider(resource_type: ResourceType, message: impl Into<String>) -> Self {
        CallbackError::Provider {
            resource_type,
            message: message.into(),
        }
    }

    /// Returns the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackError::AlreadyRegistered(_) => "AlreadyRegistered",
            CallbackError::NotRegistered(_) => "NotRegistered",
            CallbackError::DuplicateConsumer(_) => "DuplicateConsumer",
            CallbackError::UnknownResourceType(_) => "UnknownResourceType",
            CallbackError::Provider { .. } => "Provider",
        }
    }
}

impl From<CallbackError> for RpcError {
    fn from(err: CallbackError) -> Self {
        RpcError::Remote(RemoteError::new(err.kind(), err.to_string()))
    }
}

/// Produces resources of one type on demand.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the resource with the given id, or `None` if it does not
    /// exist.
    async fn provide(
        &self,
        context: &RpcContext,
        resource_id: &str,
    ) -> Result<Option<Resource>, CallbackError>;
}

/// Receives pushed resource events of one type.
#[async_trait]
pub trait ResourceConsumer: Send + Sync {
    /// Handles a batch of resources sharing one event.
    async fn handle(
        &self,
        context: &RpcContext,
        resource_type: ResourceType,
        resources: Vec<Resource>,
        event_type: EventType,
    );
}

/// Producer registry: at most one provider per resource type.
#[derive(Default)]
pub struct ResourceCallbacksManager {
    providers: RwLock<HashMap<ResourceType, Arc<dyn ResourceProvider>>>,
}

impl ResourceCallbacksManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the provider for a resource type.
    pub fn register(
        &self,
        provider: Arc<dyn ResourceProvider>,
        resource_type: ResourceType,
    ) -> Result<(), CallbackError> {
        let mut providers = self.providers.write();
        if providers.contains_key(&resource_type) {
            return Err(CallbackError::AlreadyRegistered(resource_type));
        }
        providers.insert(resource_type, provider);
        info!(resource_type = %resource_type, "Registered resource provider");
        Ok(())
    }

    /// Removes and returns the provider for a resource type.
    pub fn unregister(
        &self,
        resource_type: ResourceType,
    ) -> Result<Arc<dyn ResourceProvider>, CallbackError> {
        let provider = self
            .providers
            .write()
            .remove(&resource_type)
            .ok_or(CallbackError::NotRegistered(resource_type))?;
        info!(resource_type = %resource_type, "Unregistered resource provider");
        Ok(provider)
    }

    /// Returns the provider for a resource type.
    pub fn get_callback(
        &self,
        resource_type: ResourceType,
    ) -> Result<Arc<dyn ResourceProvider>, CallbackError> {
        self.providers
            .read()
            .get(&resource_type)
            .cloned()
            .ok_or(CallbackError::NotRegistered(resource_type))
    }

    /// Returns true if a provider is registered for the type.
    pub fn is_registered(&self, resource_type: ResourceType) -> bool {
        self.providers.read().contains_key(&resource_type)
    }

    /// Asks the registered provider for a resource.
    pub async fn pull(
        &self,
        context: &RpcContext,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<Option<Resource>, CallbackError> {
        let provider = self.get_callback(resource_type)?;
        let resource = provider.provide(context, resource_id).await?;
        debug!(
            resource_type = %resource_type,
            resource_id,
            found = resource.is_some(),
            "Pulled resource"
        );
        Ok(resource)
    }
}

/// Consumer registry: any number of consumers per resource type.
#[derive(Default)]
pub struct ConsumerCallbacksManager {
    consumers: RwLock<HashMap<ResourceType, Vec<Arc<dyn ResourceConsumer>>>>,
}

fn same_consumer(a: &Arc<dyn ResourceConsumer>, b: &Arc<dyn ResourceConsumer>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ConsumerCallbacksManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer for a resource type.
    pub fn register(
        &self,
        consumer: Arc<dyn ResourceConsumer>,
        resource_type: ResourceType,
    ) -> Result<(), CallbackError> {
        let mut consumers = self.consumers.write();
        let entry = consumers.entry(resource_type).or_default();
        if entry.iter().any(|c| same_consumer(c, &consumer)) {
            return Err(CallbackError::DuplicateConsumer(resource_type));
        }
        entry.push(consumer);
        info!(resource_type = %resource_type, count = entry.len(), "Registered resource consumer");
        Ok(())
    }

    /// Removes a consumer for a resource type.
    pub fn unregister(
        &self,
        consumer: &Arc<dyn ResourceConsumer>,
        resource_type: ResourceType,
    ) -> Result<(), CallbackError> {
        let mut consumers = self.consumers.write();
        let entry = consumers
            .get_mut(&resource_type)
            .ok_or(CallbackError::NotRegistered(resource_type))?;
        let before = entry.len();
        entry.retain(|c| !same_consumer(c, consumer));
        if entry.len() == before {
            return Err(CallbackError::NotRegistered(resource_type));
        }
        if entry.is_empty() {
            consumers.remove(&resource_type);
        }
        Ok(())
    }

    /// Returns the consumers of a resource type, in registration order.
    pub fn get_callbacks(&self, resource_type: ResourceType) -> Vec<Arc<dyn ResourceConsumer>> {
        self.consumers
            .read()
            .get(&resource_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Delivers an event to every consumer of the type.
    pub async fn dispatch(
        &self,
        context: &RpcContext,
        resource_type: ResourceType,
        resources: Vec<Resource>,
        event_type: EventType,
    ) -> usize {
        let consumers = self.get_callbacks(resource_type);
        for consumer in &consumers {
            consumer
                .handle(context, resource_type, resources.clone(), event_type)
                .await;
        }
        consumers.len()
    }
}
