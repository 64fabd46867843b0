//! The proxy dispatcher
//!
//! Each request is first matched by host name against the host table. When
//! no host route exists the request falls through to the pattern table.
//! Both tables may be changed at any time while requests are in flight;
//! locks are held for the lookup only, never while a backend is being
//! talked to.

use crate::body::Body;
use crate::director::{host_from, Director, Target};
use crate::forward::{Forward, HttpForwarder};
use crate::handler::{handler_fn, request_host, ConnInfo, Handler};
use crate::mux::ServeMux;
use crate::reverse_proxy::ReverseProxy;
use async_trait::async_trait;
use hyper::{Request, Response};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Routes requests to backends by host or by path pattern.
pub struct Proxy {
    hosts: RwLock<HashMap<String, Arc<ReverseProxy>>>,
    mux: ServeMux,
    proxy_tls: AtomicBool,
    forwarder: Arc<dyn Forward>,
}

impl Proxy {
    /// Create a proxy with empty routing tables.
    pub fn new() -> Self {
        Self::with_forwarder(Arc::new(HttpForwarder::new()))
    }

    /// Create a proxy whose backend targets start out with `forwarder`.
    pub fn with_forwarder(forwarder: Arc<dyn Forward>) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            mux: ServeMux::new(),
            proxy_tls: AtomicBool::new(false),
            forwarder,
        }
    }

    /// When set, requests that arrived over TLS keep the `https` scheme
    /// before directors run.
    pub fn set_proxy_tls(&self, enabled: bool) {
        self.proxy_tls.store(enabled, Ordering::Relaxed);
    }

    pub fn proxy_tls(&self) -> bool {
        self.proxy_tls.load(Ordering::Relaxed)
    }

    /// Register `director` for `host`.
    ///
    /// An already registered host keeps its backend target, which is
    /// returned unchanged.
    pub fn for_host(&self, host: &str, director: Director) -> Arc<ReverseProxy> {
        let mut hosts = self.hosts.write();
        if let Some(rp) = hosts.get(host) {
            debug!("Host {} already registered", host);
            return rp.clone();
        }

        let rp = Arc::new(ReverseProxy::new(director, self.forwarder.clone()));
        hosts.insert(host.to_string(), rp.clone());
        debug!("Registered host {}", host);
        rp
    }

    pub fn remove_host(&self, host: &str) {
        if self.hosts.write().remove(host).is_some() {
            debug!("Removed host {}", host);
        }
    }

    pub fn clear_hosts(&self) {
        self.hosts.write().clear();
    }

    /// The backend target registered for a bare host name, if any.
    pub fn host_target(&self, host: &str) -> Option<Arc<ReverseProxy>> {
        self.hosts.read().get(host).cloned()
    }

    /// Register `director` under `pattern`, replacing any previous
    /// registration for that pattern.
    pub fn for_pattern(&self, pattern: &str, director: Director) -> Arc<ReverseProxy> {
        let rp = Arc::new(ReverseProxy::new(director, self.forwarder.clone()));
        self.mux.handle(pattern, rp.clone());
        rp
    }

    pub fn remove_pattern(&self, pattern: &str) {
        self.mux.unhandle(pattern);
    }

    pub fn clear_patterns(&self) {
        self.mux.clear();
    }

    /// Register an arbitrary handler under `pattern`.
    pub fn handle(&self, pattern: &str, handler: Arc<dyn Handler>) {
        self.mux.handle(pattern, handler);
    }

    /// Register an async function under `pattern`.
    pub fn handle_fn<F, Fut>(&self, pattern: &str, f: F)
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        self.handle(pattern, Arc::new(handler_fn(f)));
    }
}

impl Default for Proxy {
    fn default() -> Self {
        Self::new()
    }
}

/// The target a request addressed, as seen by the proxy.
pub(crate) fn inbound_target<B>(req: &Request<B>, proxy_tls: bool) -> Target {
    let tls = ConnInfo::of(req).tls;
    let scheme = if proxy_tls && tls { "https" } else { "http" };
    Target::new(scheme, request_host(req), tls)
}

#[async_trait]
impl Handler for Proxy {
    async fn serve(&self, mut req: Request<Body>) -> Response<Body> {
        let target = inbound_target(&req, self.proxy_tls());
        let rp = self.host_target(host_from(&target.host));
        req.extensions_mut().insert(target);

        match rp {
            Some(rp) => rp.serve(req).await,
            None => self.mux.serve(req).await,
        }
    }
}
