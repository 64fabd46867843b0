//! Listener loops feeding requests into a [`Handler`]

use crate::handler::{ConnInfo, Handler};
use anyhow::{anyhow, Context, Result};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use rustls::ServerConfig;
use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Serve plain HTTP connections accepted on `listener` until it fails.
pub async fn serve<H>(listener: TcpListener, handler: Arc<H>) -> Result<()>
where
    H: Handler + 'static,
{
    info!("HTTP server listening on {}", listener.local_addr()?);

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let handler = handler.clone();

        tokio::spawn(async move {
            let conn = ConnInfo {
                tls: false,
                remote_addr: Some(remote_addr),
            };
            if let Err(e) = handle_connection(stream, conn, handler).await {
                debug!("HTTP connection error from {}: {}", remote_addr, e);
            }
        });
    }
}

/// Serve TLS connections accepted on `listener` until it fails.
pub async fn serve_tls<H>(listener: TcpListener, acceptor: TlsAcceptor, handler: Arc<H>) -> Result<()>
where
    H: Handler + 'static,
{
    info!("HTTPS server listening on {}", listener.local_addr()?);

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let handler = handler.clone();
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    debug!("TLS handshake error from {}: {}", remote_addr, e);
                    return;
                }
            };
            let conn = ConnInfo {
                tls: true,
                remote_addr: Some(remote_addr),
            };
            if let Err(e) = handle_connection(stream, conn, handler).await {
                debug!("HTTPS connection error from {}: {}", remote_addr, e);
            }
        });
    }
}

/// Handle a single connection
async fn handle_connection<S, H>(stream: S, conn: ConnInfo, handler: Arc<H>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: Handler + 'static,
{
    let io = TokioIo::new(stream);

    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(false)
        .serve_connection(
            io,
            service_fn(move |req: Request<Incoming>| {
                let handler = handler.clone();
                async move {
                    let span = info_span!(
                        "request",
                        id = %Uuid::new_v4(),
                        method = %req.method(),
                        path = %req.uri().path(),
                    );
                    let mut req = req.map(|body| body.boxed());
                    req.extensions_mut().insert(conn);

                    let response = handler.serve(req).instrument(span.clone()).await;
                    span.in_scope(|| debug!(status = %response.status(), "Response"));
                    Ok::<_, Infallible>(response)
                }
            }),
        )
        .await
        .map_err(|e| anyhow!("HTTP service error: {}", e))
}

/// Load a PEM certificate chain and private key into a server config.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let mut reader = BufReader::new(
        File::open(cert_path)
            .with_context(|| format!("Failed to open certificate {}", cert_path.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read certificate {}", cert_path.display()))?;

    let mut reader = BufReader::new(
        File::open(key_path)
            .with_context(|| format!("Failed to open private key {}", key_path.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("Failed to read private key {}", key_path.display()))?
        .ok_or_else(|| anyhow!("No private key found in {}", key_path.display()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Invalid certificate or key")?;

    Ok(Arc::new(config))
}

/// Bind a TCP listener on `addr`.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))
}
