//! The request handling contract shared by the server, the dispatcher and
//! the pattern table

use crate::body::Body;
use async_trait::async_trait;
use hyper::header::HOST;
use hyper::{Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Connection details attached to every inbound request as an extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnInfo {
    pub tls: bool,
    pub remote_addr: Option<SocketAddr>,
}

impl ConnInfo {
    pub fn of<B>(req: &Request<B>) -> Self {
        req.extensions().get::<ConnInfo>().copied().unwrap_or_default()
    }
}

/// Handles one HTTP request and produces one HTTP response.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, req: Request<Body>) -> Response<Body>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve(&self, req: Request<Body>) -> Response<Body> {
        (**self).serve(req).await
    }
}

/// Adapts an async function into a [`Handler`].
pub struct HandlerFn<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    async fn serve(&self, req: Request<Body>) -> Response<Body> {
        (self.0)(req).await
    }
}

/// The host the client addressed: the Host header, or the URI authority
/// for requests that carry none.
pub fn request_host<B>(req: &Request<B>) -> &str {
    req.headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .unwrap_or("")
}
