use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use rustls_pemfile::{certs, private_key};
use tokio::io::{AsyncRead, AsyncWrite};
use tower::Layer;
use tower_http::add_extension::{AddExtension, AddExtensionLayer};
use tracing::warn;

use crate::error::BusError;

/// Peer identity derived from the TLS client certificate's subject common name, attached
/// to every request on a connection via [`ClientCertAcceptor`].
#[derive(Debug, Clone)]
pub struct PeerIdentity(pub Option<String>);

pub fn load_server_config(
    ca_path: &Path,
    cert_path: &Path,
    key_path: &Path,
) -> Result<rustls::ServerConfig, BusError> {
    let mut roots = RootCertStore::empty();
    let ca_file = File::open(ca_path)?;
    for cert in certs(&mut BufReader::new(ca_file)) {
        roots.add(cert?)?;
    }
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| BusError::NoCertificates(e.to_string()))?;

    let cert_file = File::open(cert_path)?;
    let server_certs: Vec<_> = certs(&mut BufReader::new(cert_file)).collect::<Result<_, _>>()?;
    if server_certs.is_empty() {
        return Err(BusError::NoCertificates(cert_path.display().to_string()));
    }
    let key_file = File::open(key_path)?;
    let server_key = private_key(&mut BufReader::new(key_file))?
        .ok_or_else(|| BusError::NoCertificates(key_path.display().to_string()))?;

    let config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(server_certs, server_key)?;
    Ok(config)
}

/// Extracts the subject common name from an end-entity certificate's DER bytes.
pub(crate) fn common_name_from_der(der: &[u8]) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|s| s.to_string())
}

/// Wraps [`RustlsAcceptor`] to pull the verified client certificate's common name out of
/// the TLS session and make it available to every handler on the connection via
/// [`PeerIdentity`] in the request extensions. This is the standard pattern for surfacing
/// mTLS peer identity through `axum-server` + `rustls`, since axum's router only sees
/// plain HTTP requests once TLS has terminated.
#[derive(Clone)]
pub struct ClientCertAcceptor {
    inner: RustlsAcceptor,
}

impl ClientCertAcceptor {
    pub fn new(config: RustlsConfig) -> Self {
        Self {
            inner: RustlsAcceptor::new(config),
        }
    }
}

impl<I, S> Accept<I, S> for ClientCertAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = tokio_rustls::server::TlsStream<I>;
    type Service = AddExtension<S, PeerIdentity>;
    type Future = Pin<
        Box<dyn std::future::Future<Output = std::io::Result<(Self::Stream, Self::Service)>> + Send>,
    >;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move {
            let (tls_stream, service) = inner.accept(stream, service).await?;
            let (_, session) = tls_stream.get_ref();
            let identity = session
                .peer_certificates()
                .and_then(|certs| certs.first())
                .and_then(|cert| common_name_from_der(cert.as_ref()));
            if identity.is_none() {
                warn!("TLS session admitted without a parseable client certificate common name");
            }
            let service = AddExtensionLayer::new(PeerIdentity(identity)).layer(service);
            Ok((tls_stream, service))
        })
    }
}
