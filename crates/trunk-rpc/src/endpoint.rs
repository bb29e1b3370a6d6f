//! RPC endpoints and method-name dispatch.
//!
//! An endpoint is an object exposing a named set of methods. Dispatch goes
//! through an explicit [`MethodTable`] built at startup; the table maps
//! each wire method name to a typed handler that decodes its arguments,
//! runs, and encodes the reply.

use crate::{RpcContext, RpcError, RpcResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default endpoint API version.
pub const DEFAULT_VERSION: &str = "1.0";

/// An object that serves RPC methods.
#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    /// Returns the endpoint name.
    fn name(&self) -> &str;

    /// Returns the implemented API version ("major.minor").
    fn version(&self) -> &str {
        DEFAULT_VERSION
    }

    /// Returns the exposed method names.
    fn methods(&self) -> Vec<&'static str>;

    /// Returns true if the method is exposed.
    fn supports(&self, method: &str) -> bool {
        self.methods().contains(&method)
    }

    /// Dispatches a method call with JSON arguments.
    async fn dispatch(&self, context: RpcContext, method: &str, args: Value) -> RpcResult<Value>;
}

/// Future returned by a table handler.
pub type MethodFuture = BoxFuture<'static, RpcResult<Value>>;

type Handler<S> = Box<dyn Fn(Arc<S>, RpcContext, Value) -> MethodFuture + Send + Sync>;

/// Method-name to handler table for a service type `S`.
pub struct MethodTable<S> {
    name: String,
    version: String,
    handlers: BTreeMap<&'static str, Handler<S>>,
}

impl<S: Send + Sync + 'static> MethodTable<S> {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            handlers: BTreeMap::new(),
        }
    }

    /// Adds a handler for `method`.
    ///
    /// The handler receives arguments decoded into `A`. Its result is
    /// encoded to JSON; its error is converted into [`RpcError`].
    pub fn method<A, R, E, F, Fut>(mut self, method: &'static str, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<RpcError> + Send + 'static,
        F: Fn(Arc<S>, RpcContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let wrapped: Handler<S> = Box::new(
            move |service: Arc<S>, context: RpcContext, args: Value| -> MethodFuture {
                let args: A = match serde_json::from_value(args) {
                    Ok(args) => args,
                    Err(e) => {
                        let err = RpcError::decode(format!("arguments of '{}'", method), e);
                        return futures::future::ready(Err(err)).boxed();
                    }
                };
                let reply = handler(service, context, args);
                async move {
                    let reply = reply.await.map_err(Into::<RpcError>::into)?;
                    serde_json::to_value(reply)
                        .map_err(|e| RpcError::encode(format!("reply of '{}'", method), e))
                }
                .boxed()
            },
        );

        if self.handlers.insert(method, wrapped).is_some() {
            warn!(endpoint = %self.name, method, "Handler replaced in method table");
        }
        self
    }

    /// Returns the method names in the table.
    pub fn methods(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Binds the table to a service instance, producing an endpoint.
    pub fn bind(self, service: Arc<S>) -> BoundEndpoint<S> {
        BoundEndpoint {
            table: self,
            service,
        }
    }
}

/// A [`MethodTable`] bound to its service instance.
pub struct BoundEndpoint<S> {
    table: MethodTable<S>,
    service: Arc<S>,
}

impl<S> BoundEndpoint<S> {
    /// Returns the bound service.
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> RpcEndpoint for BoundEndpoint<S> {
    fn name(&self) -> &str {
        &self.table.name
    }

    fn version(&self) -> &str {
        &self.table.version
    }

    fn methods(&self) -> Vec<&'static str> {
        self.table.methods()
    }

    fn supports(&self, method: &str) -> bool {
        self.table.handlers.contains_key(method)
    }

    async fn dispatch(&self, context: RpcContext, method: &str, args: Value) -> RpcResult<Value> {
        let handler = self
            .table
            .handlers
            .get(method)
            .ok_or_else(|| RpcError::UnknownMethod {
                target: self.table.name.clone(),
                method: method.to_string(),
            })?;

        debug!(endpoint = %self.table.name, method, request_id = %context.request_id, "Dispatching");
        handler(Arc::clone(&self.service), context, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    #[derive(Deserialize)]
    struct AddArgs {
        amount: usize,
    }

    fn counter_endpoint() -> BoundEndpoint<Counter> {
        MethodTable::new("Counter", "1.2")
            .method("add", |svc: Arc<Counter>, _ctx: RpcContext, args: AddArgs| async move {
                Ok::<_, RpcError>(svc.hits.fetch_add(args.amount, Ordering::SeqCst) + args.amount)
            })
            .method("fail", |_svc: Arc<Counter>, _ctx: RpcContext, _args: Value| async move {
                Err::<(), _>(RpcError::remote("Boom", "handler failed"))
            })
            .bind(Arc::new(Counter::default()))
    }

    #[tokio::test]
    async fn test_dispatch_decodes_and_encodes() {
        let endpoint = counter_endpoint();

        let reply = endpoint
            .dispatch(RpcContext::admin(), "add", json!({"amount": 3}))
            .await
            .unwrap();
        assert_eq!(reply, json!(3));
        assert_eq!(endpoint.service().hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method() {
        let endpoint = counter_endpoint();
        let err = endpoint
            .dispatch(RpcContext::admin(), "remove", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::UnknownMethod { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_bad_arguments() {
        let endpoint = counter_endpoint();
        let err = endpoint
            .dispatch(RpcContext::admin(), "add", json!({"amount": "many"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode { .. }));
        assert_eq!(endpoint.service().hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let endpoint = counter_endpoint();
        let err = endpoint
            .dispatch(RpcContext::admin(), "fail", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.remote_kind(), Some("Boom"));
    }

    #[test]
    fn test_metadata() {
        let endpoint = counter_endpoint();
        assert_eq!(endpoint.name(), "Counter");
        assert_eq!(endpoint.version(), "1.2");
        assert_eq!(endpoint.methods(), vec!["add", "fail"]);
        assert!(endpoint.supports("add"));
        assert!(!endpoint.supports("remove"));
    }
}
