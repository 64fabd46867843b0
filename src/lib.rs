//! Roxy - A host and pattern based HTTP reverse proxy router
//!
//! Requests are dispatched by their `Host` header first and by URL path
//! pattern second. Each route owns a [`Director`] that rewrites the scheme,
//! host and port of the outbound request before it is forwarded:
//!
//! ```no_run
//! use roxy::{directors, to_host, to_ports, Proxy};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let proxy = Arc::new(Proxy::new());
//! proxy.for_pattern("/", directors([to_ports(8777, 8778)]));
//! proxy.for_host("localhost", to_host("crackerjack.local"));
//!
//! let listener = roxy::server::bind("0.0.0.0:5555".parse()?).await?;
//! roxy::server::serve(listener, proxy).await
//! # }
//! ```

pub mod body;
pub mod config;
pub mod director;
pub mod error;
pub mod forward;
pub mod handler;
pub mod mux;
pub mod proxy;
pub mod reverse_proxy;
pub mod server;

pub use body::Body;
pub use config::{DirectorSpec, RouteSpec};
pub use director::{directors, host_from, to_host, to_port, to_ports, to_scheme, Director, Target};
pub use error::{ConfigError, ForwardError};
pub use forward::{Forward, HttpForwarder};
pub use handler::{handler_fn, ConnInfo, Handler};
pub use mux::ServeMux;
pub use proxy::Proxy;
pub use reverse_proxy::ReverseProxy;
