//! Transport seam and the in-process transport.
//!
//! The [`Transport`] trait is all the rest of the system knows about the
//! messaging substrate. [`LocalTransport`] implements it inside one
//! process on top of the tokio runtime: every call and cast is dispatched
//! on its own task, so handlers never run on the caller's stack.

use crate::{version_is_compatible, RpcContext, RpcEndpoint, RpcError, RpcResult, Target};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Messaging substrate used by clients and servers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts serving `endpoints` on `target`.
    ///
    /// The listener stays registered until the returned handle is stopped
    /// or dropped.
    async fn serve(
        &self,
        target: Target,
        endpoints: Vec<Arc<dyn RpcEndpoint>>,
    ) -> RpcResult<RpcServer>;

    /// Invokes a method and waits for its reply.
    async fn call(
        &self,
        target: &Target,
        context: &RpcContext,
        method: &str,
        args: Value,
    ) -> RpcResult<Value>;

    /// Sends a one-way message.
    async fn cast(
        &self,
        target: &Target,
        context: &RpcContext,
        method: &str,
        args: Value,
    ) -> RpcResult<()>;
}

type StopFn = Box<dyn FnOnce() + Send + Sync>;

/// Handle of a running listener.
///
/// Dropping the handle stops the listener.
pub struct RpcServer {
    target: Target,
    endpoints: Vec<String>,
    stop: Option<StopFn>,
}

impl RpcServer {
    /// Creates a handle; `stop` deregisters the listener.
    pub fn new(
        target: Target,
        endpoints: Vec<String>,
        stop: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            target,
            endpoints,
            stop: Some(Box::new(stop)),
        }
    }

    /// Returns the served target.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the names of the served endpoints.
    pub fn endpoint_names(&self) -> &[String] {
        &self.endpoints
    }

    /// Stops the listener.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
            info!(rpc_target = %self.target, "RPC server stopped");
        }
    }
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("target", &self.target)
            .field("endpoints", &self.endpoints)
            .field("running", &self.stop.is_some())
            .finish()
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Listener {
    id: u64,
    server: Option<String>,
    endpoints: Vec<Arc<dyn RpcEndpoint>>,
}

impl Listener {
    /// Picks the endpoint serving `method` at the requested version.
    fn endpoint_for(&self, target: &Target, method: &str) -> RpcResult<Arc<dyn RpcEndpoint>> {
        let mut incompatible = None;
        for endpoint in &self.endpoints {
            if !endpoint.supports(method) {
                continue;
            }
            if let Some(requested) = &target.version {
                if !version_is_compatible(endpoint.version(), requested) {
                    incompatible = Some(RpcError::IncompatibleVersion {
                        endpoint: endpoint.name().to_string(),
                        requested: requested.clone(),
                        available: endpoint.version().to_string(),
                    });
                    continue;
                }
            }
            return Ok(Arc::clone(endpoint));
        }
        Err(incompatible.unwrap_or_else(|| RpcError::UnknownMethod {
            target: target.to_string(),
            method: method.to_string(),
        }))
    }
}

#[derive(Default)]
struct Registry {
    topics: RwLock<HashMap<String, Vec<Arc<Listener>>>>,
    next_id: AtomicU64,
    round_robin: AtomicUsize,
}

impl Registry {
    fn remove(&self, topic: &str, id: u64) {
        let mut topics = self.topics.write();
        if let Some(listeners) = topics.get_mut(topic) {
            listeners.retain(|l| l.id != id);
            if listeners.is_empty() {
                topics.remove(topic);
            }
        }
    }

    fn matching(&self, target: &Target) -> Vec<Arc<Listener>> {
        self.topics
            .read()
            .get(&target.topic)
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|l| target.server.is_none() || l.server == target.server)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn select(&self, target: &Target) -> RpcResult<Arc<Listener>> {
        let candidates = self.matching(target);
        if candidates.is_empty() {
            return Err(RpcError::no_listener(target));
        }
        let index = self.round_robin.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Ok(Arc::clone(&candidates[index]))
    }
}

/// In-process transport.
///
/// Cloning shares the listener registry, so one instance can be handed to
/// the server and to any number of agents.
#[derive(Clone, Default)]
pub struct LocalTransport {
    registry: Arc<Registry>,
}

impl LocalTransport {
    /// Creates a transport with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of listeners on a topic.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.registry
            .topics
            .read()
            .get(topic)
            .map_or(0, |listeners| listeners.len())
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn serve(
        &self,
        target: Target,
        endpoints: Vec<Arc<dyn RpcEndpoint>>,
    ) -> RpcResult<RpcServer> {
        if endpoints.is_empty() {
            return Err(RpcError::invalid_target(&target, "no endpoints to serve"));
        }

        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let names: Vec<String> = endpoints.iter().map(|e| e.name().to_string()).collect();
        {
            let mut topics = self.registry.topics.write();
            let listeners = topics.entry(target.topic.clone()).or_default();
            if target.server.is_some() && listeners.iter().any(|l| l.server == target.server) {
                return Err(RpcError::DuplicateListener {
                    target: target.to_string(),
                });
            }
            listeners.push(Arc::new(Listener {
                id,
                server: target.server.clone(),
                endpoints,
            }));
        }
        info!(rpc_target = %target, endpoints = ?names, "RPC server listening");

        let registry: Weak<Registry> = Arc::downgrade(&self.registry);
        let topic = target.topic.clone();
        Ok(RpcServer::new(target, names, move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&topic, id);
            }
        }))
    }

    async fn call(
        &self,
        target: &Target,
        context: &RpcContext,
        method: &str,
        args: Value,
    ) -> RpcResult<Value> {
        if target.fanout {
            return Err(RpcError::invalid_target(target, "call cannot be fanned out"));
        }
        let listener = self.registry.select(target)?;
        let endpoint = listener.endpoint_for(target, method)?;

        debug!(rpc_target = %target, method, request_id = %context.request_id, "RPC call");
        let context = context.clone();
        let method_name = method.to_string();
        let handle =
            tokio::spawn(async move { endpoint.dispatch(context, &method_name, args).await });

        match handle.await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(e.into_remote()),
            Err(e) => Err(RpcError::Dispatch {
                method: method.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn cast(
        &self,
        target: &Target,
        context: &RpcContext,
        method: &str,
        args: Value,
    ) -> RpcResult<()> {
        let listeners = if target.fanout {
            self.registry.matching(target)
        } else {
            vec![self.registry.select(target)?]
        };

        if listeners.is_empty() {
            debug!(rpc_target = %target, method, "Fanout cast has no listeners");
            return Ok(());
        }

        debug!(rpc_target = %target, method, listeners = listeners.len(), "RPC cast");
        for listener in listeners {
            let endpoint = match listener.endpoint_for(target, method) {
                Ok(endpoint) => endpoint,
                Err(e) if target.fanout => {
                    warn!(rpc_target = %target, server = ?listener.server, error = %e, "Skipping listener");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let context = context.clone();
            let method_name = method.to_string();
            let args = args.clone();
            tokio::spawn(async move {
                if let Err(e) = endpoint.dispatch(context, &method_name, args).await {
                    warn!(method = %method_name, error = %e, "Cast handler failed");
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MethodTable;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Host {
        name: String,
        casts: mpsc::UnboundedSender<(String, Value)>,
        calls: Mutex<usize>,
    }

    fn host_endpoint(
        name: &str,
        version: &str,
    ) -> (Arc<dyn RpcEndpoint>, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Arc::new(Host {
            name: name.to_string(),
            casts: tx,
            calls: Mutex::new(0),
        });
        let endpoint = MethodTable::new("Host", version)
            .method("whoami", |host: Arc<Host>, _ctx: RpcContext, _args: Value| async move {
                *host.calls.lock() += 1;
                Ok::<_, RpcError>(host.name.clone())
            })
            .method("notify", |host: Arc<Host>, _ctx: RpcContext, args: Value| async move {
                let _ = host.casts.send((host.name.clone(), args));
                Ok::<_, RpcError>(())
            })
            .method("fail", |_host: Arc<Host>, _ctx: RpcContext, _args: Value| async move {
                Err::<(), _>(RpcError::invalid_target("nowhere", "always fails"))
            })
            .bind(host);
        (Arc::new(endpoint), rx)
    }

    async fn whoami(transport: &LocalTransport, target: &Target) -> RpcResult<Value> {
        transport
            .call(target, &RpcContext::admin(), "whoami", Value::Null)
            .await
    }

    #[tokio::test]
    async fn test_call_addressed_to_server() {
        let transport = LocalTransport::new();
        let (a, _rx_a) = host_endpoint("a", "1.0");
        let (b, _rx_b) = host_endpoint("b", "1.0");
        let _server_a = transport
            .serve(Target::new("hosts").with_server("a"), vec![a])
            .await
            .unwrap();
        let _server_b = transport
            .serve(Target::new("hosts").with_server("b"), vec![b])
            .await
            .unwrap();

        for _ in 0..3 {
            let reply = whoami(&transport, &Target::new("hosts").with_server("b")).await;
            assert_eq!(reply.unwrap(), json!("b"));
        }
    }

    #[tokio::test]
    async fn test_unaddressed_calls_rotate() {
        let transport = LocalTransport::new();
        let (a, _rx_a) = host_endpoint("a", "1.0");
        let (b, _rx_b) = host_endpoint("b", "1.0");
        let _server_a = transport
            .serve(Target::new("hosts").with_server("a"), vec![a])
            .await
            .unwrap();
        let _server_b = transport
            .serve(Target::new("hosts").with_server("b"), vec![b])
            .await
            .unwrap();

        let mut replies = Vec::new();
        for _ in 0..4 {
            replies.push(whoami(&transport, &Target::new("hosts")).await.unwrap());
        }
        assert!(replies.contains(&json!("a")));
        assert!(replies.contains(&json!("b")));
    }

    #[tokio::test]
    async fn test_call_without_listener() {
        let transport = LocalTransport::new();
        let err = whoami(&transport, &Target::new("nobody")).await.unwrap_err();
        assert!(matches!(err, RpcError::NoListener { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_server_rejected() {
        let transport = LocalTransport::new();
        let (a, _rx_a) = host_endpoint("a", "1.0");
        let (a2, _rx_a2) = host_endpoint("a", "1.0");
        let _server = transport
            .serve(Target::new("hosts").with_server("a"), vec![a])
            .await
            .unwrap();

        let err = transport
            .serve(Target::new("hosts").with_server("a"), vec![a2])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::DuplicateListener { .. }));
    }

    #[tokio::test]
    async fn test_dropping_server_stops_listener() {
        let transport = LocalTransport::new();
        let (a, _rx) = host_endpoint("a", "1.0");
        let server = transport
            .serve(Target::new("hosts").with_server("a"), vec![a])
            .await
            .unwrap();
        assert_eq!(transport.listener_count("hosts"), 1);

        drop(server);
        assert_eq!(transport.listener_count("hosts"), 0);
        assert!(whoami(&transport, &Target::new("hosts")).await.is_err());
    }

    #[tokio::test]
    async fn test_version_negotiation() {
        let transport = LocalTransport::new();
        let (a, _rx) = host_endpoint("a", "1.1");
        let _server = transport.serve(Target::new("hosts"), vec![a]).await.unwrap();

        assert!(whoami(&transport, &Target::new("hosts").with_version("1.0")).await.is_ok());
        let err = whoami(&transport, &Target::new("hosts").with_version("1.2"))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::IncompatibleVersion { .. }));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let transport = LocalTransport::new();
        let (a, _rx) = host_endpoint("a", "1.0");
        let _server = transport.serve(Target::new("hosts"), vec![a]).await.unwrap();

        let err = transport
            .call(&Target::new("hosts"), &RpcContext::admin(), "reboot", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::UnknownMethod { .. }));
    }

    #[tokio::test]
    async fn test_handler_errors_become_remote() {
        let transport = LocalTransport::new();
        let (a, _rx) = host_endpoint("a", "1.0");
        let _server = transport.serve(Target::new("hosts"), vec![a]).await.unwrap();

        let err = transport
            .call(&Target::new("hosts"), &RpcContext::admin(), "fail", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.remote_kind(), Some("InvalidTarget"));
    }

    #[tokio::test]
    async fn test_fanout_cast_reaches_every_listener() {
        let transport = LocalTransport::new();
        let (a, mut rx_a) = host_endpoint("a", "1.0");
        let (b, mut rx_b) = host_endpoint("b", "1.0");
        let _server_a = transport
            .serve(Target::new("events").with_server("a"), vec![a])
            .await
            .unwrap();
        let _server_b = transport
            .serve(Target::new("events").with_server("b"), vec![b])
            .await
            .unwrap();

        transport
            .cast(&Target::new("events").fanout(), &RpcContext::admin(), "notify", json!({"n": 1}))
            .await
            .unwrap();

        let got_a = tokio::time::timeout(Duration::from_secs(1), rx_a.recv()).await.unwrap();
        let got_b = tokio::time::timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap();
        assert_eq!(got_a, Some(("a".to_string(), json!({"n": 1}))));
        assert_eq!(got_b, Some(("b".to_string(), json!({"n": 1}))));
    }

    #[tokio::test]
    async fn test_fanout_cast_without_listeners_is_ok() {
        let transport = LocalTransport::new();
        transport
            .cast(&Target::new("events").fanout(), &RpcContext::admin(), "notify", Value::Null)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_call_rejects_fanout_target() {
        let transport = LocalTransport::new();
        let err = whoami(&transport, &Target::new("hosts").fanout()).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidTarget { .. }));
    }
}
