use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to load TLS material: {0}")]
    Tls(#[from] std::io::Error),
    #[error("failed to build TLS server config: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("failed to load trust map: {0}")]
    TrustMap(#[from] sentrygrid_crypto::CryptoError),
    #[error("no certificates found at {0}")]
    NoCertificates(String),
}
