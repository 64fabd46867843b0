//! Error types

use std::io;
use thiserror::Error;

/// Failures while forwarding a request to a backend.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid backend target {0:?}")]
    InvalidTarget(String),

    #[error("failed to connect to backend {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to backend {0}")]
    ConnectTimeout(String),

    #[error("invalid TLS server name {0:?}")]
    ServerName(String),

    #[error("TLS handshake with backend {addr} failed: {source}")]
    Tls {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("backend HTTP error: {0}")]
    Http(#[from] hyper::Error),
}

/// Invalid route specifications.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("route {0:?} is missing '='")]
    MissingSeparator(String),

    #[error("route {0:?} has an empty key")]
    EmptyKey(String),

    #[error("unknown route item {0:?}")]
    UnknownItem(String),

    #[error("invalid port {0:?}")]
    InvalidPort(String),
}
