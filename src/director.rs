//! Directors rewrite the outbound target of a proxied request
//!
//! A director only ever touches the scheme, host and port of a [`Target`].
//! Directors are composed with [`directors`], which applies each one in
//! order against the same target, so later directors see the results of
//! earlier ones.

use std::fmt;
use std::sync::Arc;

/// The rewritable part of a request: where it is going and how it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Target {
    pub scheme: String,
    /// Host, optionally with a `:port` suffix.
    pub host: String,
    /// Whether the inbound request arrived over TLS.
    pub tls: bool,
}

impl Target {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, tls: bool) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            tls,
        }
    }
}

/// A rule that rewrites a [`Target`] before the request is forwarded.
#[derive(Clone)]
pub struct Director(Arc<dyn Fn(&mut Target) + Send + Sync>);

impl Director {
    /// Wrap an arbitrary rewrite function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Target) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Apply this director to `target`.
    pub fn direct(&self, target: &mut Target) {
        (self.0)(target)
    }
}

impl fmt::Debug for Director {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Director")
    }
}

/// Chain the given directors into a single director.
pub fn directors<I>(directors: I) -> Director
where
    I: IntoIterator<Item = Director>,
{
    let chain: Vec<Director> = directors.into_iter().collect();
    Director::new(move |target| {
        for d in &chain {
            d.direct(target);
        }
    })
}

/// Returns the host portion without the colon and port.
///
/// Only the first colon is considered, and only when something precedes it.
pub fn host_from(host: &str) -> &str {
    match host.find(':') {
        Some(i) if i > 0 => &host[..i],
        _ => host,
    }
}

/// Proxy to the given scheme.
pub fn to_scheme(scheme: impl Into<String>) -> Director {
    let scheme = scheme.into();
    Director::new(move |target| target.scheme.clone_from(&scheme))
}

/// Proxy to the given host, replacing any existing host and port.
pub fn to_host(host: impl Into<String>) -> Director {
    let host = host.into();
    Director::new(move |target| target.host.clone_from(&host))
}

/// Proxy to the given port, keeping the host.
pub fn to_port(port: u16) -> Director {
    let port = format!(":{}", port);
    Director::new(move |target| {
        target.host = format!("{}{}", host_from(&target.host), port);
    })
}

/// Proxy to `http_port` when the inbound request is plain HTTP and to
/// `https_port` when it arrived over TLS.
pub fn to_ports(http_port: u16, https_port: u16) -> Director {
    let http = format!(":{}", http_port);
    let https = format!(":{}", https_port);
    Director::new(move |target| {
        let port = if target.tls { &https } else { &http };
        target.host = format!("{}{}", host_from(&target.host), port);
    })
}
