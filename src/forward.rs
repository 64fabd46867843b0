//! Forwarding of rewritten requests to backends
//!
//! [`Forward`] is the seam between routing and the network: it receives a
//! request whose URI is absolute (`scheme://host:port/path?query`) and
//! returns the backend's response. [`HttpForwarder`] is the default
//! implementation, speaking HTTP/1.1 over TCP or TLS.

use crate::body::Body;
use crate::error::ForwardError;
use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::http::uri::{Parts, PathAndQuery};
use hyper::{Request, Response, Uri, Version};
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Sends a fully rewritten request to its backend.
#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ForwardError>;
}

/// Default connect timeout for [`HttpForwarder`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP/1.1 forwarder opening one backend connection per request.
pub struct HttpForwarder {
    connect_timeout: Option<Duration>,
    tls: TlsConnector,
}

impl HttpForwarder {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HttpForwarderBuilder {
        HttpForwarderBuilder::default()
    }

    async fn connect(&self, addr: &str) -> Result<TcpStream, ForwardError> {
        let connect = TcpStream::connect(addr);
        let result = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| ForwardError::ConnectTimeout(addr.to_string()))?,
            None => connect.await,
        };

        result.map_err(|source| ForwardError::Connect {
            addr: addr.to_string(),
            source,
        })
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Forward for HttpForwarder {
    async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let (mut parts, body) = req.into_parts();

        let host = parts
            .uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ForwardError::InvalidTarget(parts.uri.to_string()))?
            .to_string();
        let https = match parts.uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("https") => true,
            Some(s) if s.eq_ignore_ascii_case("http") => false,
            _ => return Err(ForwardError::InvalidTarget(parts.uri.to_string())),
        };
        let port = parts.uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        let addr = format!("{}:{}", host, port);

        // Backends receive origin-form request targets.
        parts.uri = origin_form(&parts.uri)?;
        parts.version = Version::HTTP_11;
        let req = Request::from_parts(parts, body);

        debug!("Forwarding to {} ({})", addr, if https { "https" } else { "http" });

        let stream = self.connect(&addr).await?;
        if https {
            let sni = host.trim_start_matches('[').trim_end_matches(']').to_string();
            let name = ServerName::try_from(sni)
                .map_err(|_| ForwardError::ServerName(host.clone()))?;
            let stream = self
                .tls
                .connect(name, stream)
                .await
                .map_err(|source| ForwardError::Tls {
                    addr: addr.clone(),
                    source,
                })?;
            send(stream, req).await
        } else {
            send(stream, req).await
        }
    }
}

fn origin_form(uri: &Uri) -> Result<Uri, ForwardError> {
    let mut parts = Parts::default();
    parts.path_and_query = Some(
        uri.path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/")),
    );
    Uri::from_parts(parts).map_err(|_| ForwardError::InvalidTarget(uri.to_string()))
}

async fn send<I>(io: I, req: Request<Body>) -> Result<Response<Body>, ForwardError>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("Backend connection error: {}", e);
        }
    });

    let response = sender.send_request(req).await?;
    Ok(response.map(|body| body.boxed()))
}

/// Outbound transport policy for an [`HttpForwarder`].
#[derive(Debug, Clone)]
pub struct HttpForwarderBuilder {
    connect_timeout: Option<Duration>,
    insecure_skip_verify: bool,
}

impl Default for HttpForwarderBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            insecure_skip_verify: false,
        }
    }
}

impl HttpForwarderBuilder {
    /// `None` waits for the operating system's own connect timeout.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Accept any certificate presented by an https backend.
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    pub fn build(self) -> HttpForwarder {
        let config = if self.insecure_skip_verify {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth()
        } else {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        };

        HttpForwarder {
            connect_timeout: self.connect_timeout,
            tls: TlsConnector::from(Arc::new(config)),
        }
    }
}

#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
