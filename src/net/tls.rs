//! TLS configuration, certificate loading and handshakes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

/// A TLS-terminated server-side stream.
pub type TlsStream = tokio_rustls::server::TlsStream<TcpStream>;

/// Errors raised while building the TLS acceptor. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PEM data: {0}")]
    Pem(std::io::Error),

    #[error("no certificates found in certificate file")]
    NoCertificates,

    #[error("no private key found in key file")]
    NoPrivateKey,

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// Errors from the per-connection TLS handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("TLS handshake timed out")]
    TimedOut,

    #[error("TLS handshake failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Load a TLS acceptor from certificate and key files.
pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let cert_pem = read_file(cert_path)?;
    let key_pem = read_file(key_path)?;
    tls_acceptor_from_pem(&cert_pem, &key_pem)
}

/// Build a TLS acceptor from in-memory PEM certificate chain and private key.
///
/// Negotiates TLS 1.3 or TLS 1.2 only, and advertises `http/1.1` via ALPN.
pub fn tls_acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsAcceptor, TlsError> {
    let mut cert_reader = cert_pem;
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }

    let mut key_reader = key_pem;
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(TlsError::Pem)?
        .ok_or(TlsError::NoPrivateKey)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Run the server side of a TLS handshake, bounded by `timeout`.
pub async fn accept_tls(
    acceptor: &TlsAcceptor,
    stream: TcpStream,
    timeout: Duration,
) -> Result<TlsStream, HandshakeError> {
    match tokio::time::timeout(timeout, acceptor.accept(stream)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(HandshakeError::Io(e)),
        Err(_) => Err(HandshakeError::TimedOut),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.display().to_string(),
        source,
    })
}
