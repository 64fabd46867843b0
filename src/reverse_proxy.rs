//! Backend targets
//!
//! A [`ReverseProxy`] pairs a [`Director`] with the [`Forward`]
//! implementation used to reach the backend. Registration methods on
//! [`crate::Proxy`] hand these out so callers can adjust the transport of a
//! single backend after the fact.

use crate::body::{bad_gateway, Body};
use crate::director::{Director, Target};
use crate::forward::Forward;
use crate::handler::{request_host, ConnInfo, Handler};
use crate::proxy::inbound_target;
use async_trait::async_trait;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use hyper::{Request, Response, Uri};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error};

// Headers that describe a single connection and must not be forwarded.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

pub struct ReverseProxy {
    director: Director,
    forwarder: RwLock<Arc<dyn Forward>>,
}

impl ReverseProxy {
    pub fn new(director: Director, forwarder: Arc<dyn Forward>) -> Self {
        Self {
            director,
            forwarder: RwLock::new(forwarder),
        }
    }

    pub fn director(&self) -> &Director {
        &self.director
    }

    pub fn forwarder(&self) -> Arc<dyn Forward> {
        self.forwarder.read().clone()
    }

    /// Replace the transport used for this backend only.
    pub fn set_forwarder(&self, forwarder: Arc<dyn Forward>) {
        *self.forwarder.write() = forwarder;
    }
}

#[async_trait]
impl Handler for ReverseProxy {
    async fn serve(&self, mut req: Request<Body>) -> Response<Body> {
        let conn = ConnInfo::of(&req);
        let mut target = match req.extensions_mut().remove::<Target>() {
            Some(t) => t,
            None => inbound_target(&req, false),
        };
        self.director.direct(&mut target);

        let uri = match outbound_uri(&target, &req) {
            Some(uri) => uri,
            None => {
                error!("Invalid backend target {}://{}", target.scheme, target.host);
                return bad_gateway();
            }
        };
        debug!("{} {} -> {}", req.method(), req.uri(), uri);

        let host = request_host(&req).to_string();
        let (mut parts, body) = req.into_parts();
        parts.uri = uri;
        strip_hop_headers(&mut parts.headers);

        if !parts.headers.contains_key(HOST) {
            if let Ok(value) = HeaderValue::from_str(&host) {
                parts.headers.insert(HOST, value);
            }
        }
        if let Some(addr) = conn.remote_addr {
            append_forwarded_for(&mut parts.headers, &addr.ip().to_string());
        }

        let forwarder = self.forwarder();
        match forwarder.forward(Request::from_parts(parts, body)).await {
            Ok(mut response) => {
                strip_hop_headers(response.headers_mut());
                response
            }
            Err(e) => {
                error!("Proxy error: {}", e);
                bad_gateway()
            }
        }
    }
}

fn outbound_uri<B>(target: &Target, req: &Request<B>) -> Option<Uri> {
    if target.host.is_empty() {
        return None;
    }
    let path = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}://{}{}", target.scheme, target.host, path).parse().ok()
}

fn strip_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_HEADERS {
        headers.remove(*name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::empty;
    use crate::director::{directors, to_host, to_port, to_scheme};
    use crate::error::ForwardError;
    use hyper::StatusCode;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Request<()>>>,
    }

    #[async_trait]
    impl Forward for Recorder {
        async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ForwardError> {
            self.seen.lock().push(req.map(|_| ()));
            Ok(Response::new(empty()))
        }
    }

    struct Failing;

    #[async_trait]
    impl Forward for Failing {
        async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ForwardError> {
            Err(ForwardError::ConnectTimeout(req.uri().to_string()))
        }
    }

    fn request() -> Request<Body> {
        let mut req = Request::builder()
            .uri("/items?id=7")
            .header(HOST, "front.local:5555")
            .header(CONNECTION, "keep-alive, x-session")
            .header("x-session", "drop me")
            .header("keep-alive", "timeout=5")
            .header("x-forwarded-for", "10.0.0.1")
            .header("accept", "text/plain")
            .body(empty())
            .unwrap();
        req.extensions_mut().insert(ConnInfo {
            tls: false,
            remote_addr: Some("192.168.1.9:40000".parse().unwrap()),
        });
        req
    }

    #[tokio::test]
    async fn test_rewrites_and_forwards() {
        let recorder = Arc::new(Recorder::default());
        let rp = ReverseProxy::new(
            directors([to_scheme("https"), to_host("backend.internal"), to_port(8443)]),
            recorder.clone(),
        );

        let response = rp.serve(request()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let seen = recorder.seen.lock();
        let out = &seen[0];
        assert_eq!(out.uri(), "https://backend.internal:8443/items?id=7");
        assert_eq!(out.headers()[HOST], "front.local:5555");
        assert_eq!(out.headers()["accept"], "text/plain");
        assert_eq!(out.headers()["x-forwarded-for"], "10.0.0.1, 192.168.1.9");
        assert!(out.headers().get(CONNECTION).is_none());
        assert!(out.headers().get("keep-alive").is_none());
        assert!(out.headers().get("x-session").is_none());
    }

    #[tokio::test]
    async fn test_uses_target_from_extensions() {
        let recorder = Arc::new(Recorder::default());
        let rp = ReverseProxy::new(to_port(9090), recorder.clone());

        let mut req = request();
        req.extensions_mut().insert(Target::new("https", "api.local:5556", true));
        rp.serve(req).await;

        assert_eq!(recorder.seen.lock()[0].uri(), "https://api.local:9090/items?id=7");
    }

    #[tokio::test]
    async fn test_forward_failure_is_bad_gateway() {
        let rp = ReverseProxy::new(to_port(1), Arc::new(Failing));
        let response = rp.serve(request()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_empty_host_is_bad_gateway() {
        let recorder = Arc::new(Recorder::default());
        let rp = ReverseProxy::new(to_host(""), recorder.clone());
        let response = rp.serve(request()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(recorder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_set_forwarder() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let rp = ReverseProxy::new(to_port(80), first.clone());
        rp.set_forwarder(second.clone());

        rp.serve(request()).await;
        assert!(first.seen.lock().is_empty());
        assert_eq!(second.seen.lock().len(), 1);
    }
}
