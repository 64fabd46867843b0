//! Path pattern multiplexer
//!
//! Patterns name fixed paths like `/favicon.ico` or rooted subtrees like
//! `/static/` (note the trailing slash). Longer patterns take precedence
//! over shorter ones, so `/static/img/` wins over `/static/` for
//! `/static/img/a.png`. A pattern may begin with a host name, as in
//! `cdn.local/assets/`, restricting it to requests for that host; host
//! patterns are consulted before plain ones.
//!
//! Requesting `/tree` when only `/tree/` is registered redirects to
//! `/tree/`.

use crate::body::{not_found, redirect_response, Body};
use crate::director::host_from;
use crate::handler::{request_host, Handler};
use async_trait::async_trait;
use hyper::{Request, Response};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct Table {
    entries: HashMap<String, Arc<dyn Handler>>,
    // Set once any pattern carries a host.
    hosts: bool,
}

impl Table {
    fn lookup(&self, path: &str) -> Option<Arc<dyn Handler>> {
        if let Some(h) = self.entries.get(path) {
            return Some(h.clone());
        }
        self.entries
            .iter()
            .filter(|(pattern, _)| pattern.ends_with('/') && path.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, h)| h.clone())
    }

    fn should_redirect(&self, host: &str, path: &str) -> bool {
        let host_path = format!("{}{}", host, path);
        if self.entries.contains_key(path) || self.entries.contains_key(&host_path) {
            return false;
        }
        if path.is_empty() || path.ends_with('/') {
            return false;
        }
        self.entries.contains_key(&format!("{}/", path))
            || self.entries.contains_key(&format!("{}/", host_path))
    }
}

enum Route {
    Handler(Arc<dyn Handler>),
    Redirect(String),
    NotFound,
}

/// A thread-safe pattern to handler table.
#[derive(Default)]
pub struct ServeMux {
    table: RwLock<Table>,
}

impl ServeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `pattern`, replacing any previous handler
    /// for the same pattern.
    pub fn handle(&self, pattern: &str, handler: Arc<dyn Handler>) {
        if pattern.is_empty() {
            warn!("Ignoring handler registered under an empty pattern");
            return;
        }
        let mut table = self.table.write();
        if !pattern.starts_with('/') {
            table.hosts = true;
        }
        if table.entries.insert(pattern.to_string(), handler).is_some() {
            debug!("Replaced handler for pattern {}", pattern);
        } else {
            debug!("Registered handler for pattern {}", pattern);
        }
    }

    /// Remove the handler registered under `pattern`, if any.
    pub fn unhandle(&self, pattern: &str) {
        let mut table = self.table.write();
        table.entries.remove(pattern);
        table.hosts = table.entries.keys().any(|p| !p.starts_with('/'));
    }

    /// Remove every registered handler.
    pub fn clear(&self) {
        let mut table = self.table.write();
        table.entries.clear();
        table.hosts = false;
    }

    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the handler for a host (port already stripped) and path.
    pub fn handler(&self, host: &str, path: &str) -> Option<Arc<dyn Handler>> {
        let table = self.table.read();
        let mut h = None;
        if table.hosts {
            h = table.lookup(&format!("{}{}", host, path));
        }
        h.or_else(|| table.lookup(path))
    }

    fn route<B>(&self, req: &Request<B>) -> Route {
        let host = host_from(request_host(req));
        let path = req.uri().path();

        if self.table.read().should_redirect(host, path) {
            let location = match req.uri().query() {
                Some(q) => format!("{}/?{}", path, q),
                None => format!("{}/", path),
            };
            return Route::Redirect(location);
        }

        match self.handler(host, path) {
            Some(h) => Route::Handler(h),
            None => Route::NotFound,
        }
    }
}

#[async_trait]
impl Handler for ServeMux {
    async fn serve(&self, req: Request<Body>) -> Response<Body> {
        // The table lock is released before the handler runs.
        match self.route(&req) {
            Route::Handler(h) => h.serve(req).await,
            Route::Redirect(location) => redirect_response(&location),
            Route::NotFound => {
                debug!("No pattern matches {}", req.uri().path());
                not_found()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{empty, full};
    use crate::handler::handler_fn;
    use http_body_util::BodyExt;
    use hyper::header::{HOST, LOCATION};
    use hyper::StatusCode;

    fn named(name: &'static str) -> Arc<dyn Handler> {
        Arc::new(handler_fn(move |_req: Request<Body>| async move {
            Response::new(full(name))
        }))
    }

    fn request(host: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(HOST, host)
            .body(empty())
            .unwrap()
    }

    async fn body_of(mux: &ServeMux, host: &str, uri: &str) -> (StatusCode, String) {
        let response = mux.serve(request(host, uri)).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[tokio::test]
    async fn test_exact_and_subtree() {
        let mux = ServeMux::new();
        mux.handle("/", named("root"));
        mux.handle("/static/", named("static"));
        mux.handle("/static/img/", named("img"));
        mux.handle("/favicon.ico", named("icon"));

        assert_eq!(body_of(&mux, "a", "/favicon.ico").await.1, "icon");
        assert_eq!(body_of(&mux, "a", "/favicon.ico/x").await.1, "root");
        assert_eq!(body_of(&mux, "a", "/static/x.png").await.1, "static");
        assert_eq!(body_of(&mux, "a", "/static/img/x.png").await.1, "img");
        assert_eq!(body_of(&mux, "a", "/other").await.1, "root");
    }

    #[tokio::test]
    async fn test_not_found() {
        let mux = ServeMux::new();
        mux.handle("/only", named("only"));

        let (status, body) = body_of(&mux, "a", "/only/not").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found\n");
    }

    #[tokio::test]
    async fn test_subtree_redirect() {
        let mux = ServeMux::new();
        mux.handle("/static/", named("static"));

        let response = mux.serve(request("a", "/static?v=1")).await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[LOCATION], "/static/?v=1");

        // No redirect once the exact path is registered.
        mux.handle("/static", named("exact"));
        assert_eq!(body_of(&mux, "a", "/static").await.1, "exact");
    }

    #[tokio::test]
    async fn test_host_patterns_take_precedence() {
        let mux = ServeMux::new();
        mux.handle("/", named("root"));
        mux.handle("cdn.local/assets/", named("cdn"));

        assert_eq!(body_of(&mux, "cdn.local:8080", "/assets/a.js").await.1, "cdn");
        assert_eq!(body_of(&mux, "www.local", "/assets/a.js").await.1, "root");
    }

    #[tokio::test]
    async fn test_replace_remove_clear() {
        let mux = ServeMux::new();
        mux.handle("/p/", named("first"));
        mux.handle("/p/", named("second"));
        assert_eq!(mux.len(), 1);
        assert_eq!(body_of(&mux, "a", "/p/x").await.1, "second");

        mux.handle("/q", named("q"));
        mux.unhandle("/p/");
        assert_eq!(body_of(&mux, "a", "/p/x").await.0, StatusCode::NOT_FOUND);
        assert_eq!(body_of(&mux, "a", "/q").await.1, "q");

        mux.clear();
        assert!(mux.is_empty());
        assert_eq!(body_of(&mux, "a", "/q").await.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_empty_pattern_ignored() {
        let mux = ServeMux::new();
        mux.handle("", named("nothing"));
        assert!(mux.is_empty());
    }
}
