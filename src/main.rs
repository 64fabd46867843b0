//! Roxy - Main entry point
//!
//! Serves a [`roxy::Proxy`] over HTTP and, optionally, HTTPS with routes
//! given on the command line.

use anyhow::{Context, Result};
use clap::Parser;
use roxy::{server, HttpForwarder, Proxy, RouteSpec};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Roxy - A host and pattern based HTTP reverse proxy
#[derive(Parser, Debug)]
#[command(name = "roxy")]
#[command(author = "Roxy Contributors")]
#[command(version = "1.0.0")]
#[command(about = "A host and pattern based HTTP reverse proxy")]
struct Args {
    /// HTTP address to listen on
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:5555")]
    http_addr: SocketAddr,

    /// HTTPS address to listen on (requires --tls-cert and --tls-key)
    #[arg(long, env = "HTTPS_ADDR")]
    https_addr: Option<SocketAddr>,

    /// PEM certificate chain for the HTTPS listener
    #[arg(long, env = "TLS_CERT")]
    tls_cert: Option<PathBuf>,

    /// PEM private key for the HTTPS listener
    #[arg(long, env = "TLS_KEY")]
    tls_key: Option<PathBuf>,

    /// Keep the https scheme for requests that arrived over TLS
    #[arg(long, env = "PROXY_TLS", default_value = "false")]
    proxy_tls: bool,

    /// Host route, e.g. `localhost=host:crackerjack.local` (repeatable)
    #[arg(long = "host", value_name = "SPEC")]
    hosts: Vec<RouteSpec>,

    /// Pattern route, e.g. `/=ports:8777/8778` (repeatable)
    #[arg(long = "pattern", value_name = "SPEC")]
    patterns: Vec<RouteSpec>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn insecure_forwarder() -> Arc<HttpForwarder> {
    Arc::new(HttpForwarder::builder().insecure_skip_verify(true).build())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Roxy v1.0.0");

    let proxy = Arc::new(Proxy::new());
    proxy.set_proxy_tls(args.proxy_tls);

    for route in &args.hosts {
        let rp = proxy.for_host(&route.key, route.director());
        if route.insecure {
            rp.set_forwarder(insecure_forwarder());
        }
        info!("Host route: {}", route.key);
    }
    for route in &args.patterns {
        let rp = proxy.for_pattern(&route.key, route.director());
        if route.insecure {
            rp.set_forwarder(insecure_forwarder());
        }
        info!("Pattern route: {}", route.key);
    }

    let http = server::serve(server::bind(args.http_addr).await?, proxy.clone());

    match (args.https_addr, args.tls_cert, args.tls_key) {
        (Some(addr), Some(cert), Some(key)) => {
            let config = server::load_tls_config(&cert, &key)
                .context("Failed to load TLS certificate")?;
            let https = server::serve_tls(
                server::bind(addr).await?,
                TlsAcceptor::from(config),
                proxy,
            );
            tokio::try_join!(http, https)?;
        }
        (Some(_), _, _) => {
            anyhow::bail!("--https-addr requires --tls-cert and --tls-key");
        }
        _ => http.await?,
    }

    Ok(())
}
