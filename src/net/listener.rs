//! TCP listener implementation.
//!
//! # Responsibilities
//! - Bind to the configured `host:port`
//! - Accept incoming TCP connections
//! - Defer the TLS handshake to whoever processes the connection
//! - Graceful handling of accept errors

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

use crate::net::connection::{Connection, ConnectionId};
use crate::net::tls::{accept_tls, HandshakeError, TlsStream};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bound TCP listener whose connections are upgraded to TLS after dispatch.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to a `host:port` address. Host names are resolved.
    pub async fn bind(address: &str) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(address)
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Accept the next TCP connection. No TLS bytes are exchanged yet.
    pub async fn accept(&self) -> Result<PendingConnection, ListenerError> {
        let (stream, peer_addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        let _ = stream.set_nodelay(true);

        let pending = PendingConnection {
            stream,
            peer_addr,
            id: ConnectionId::new(),
            accepted_at: Instant::now(),
        };

        tracing::debug!(
            connection_id = %pending.id,
            peer_addr = %peer_addr,
            "Connection accepted"
        );

        Ok(pending)
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// An accepted TCP connection waiting for processing.
///
/// Dropping it closes the socket without sending anything.
#[derive(Debug)]
pub struct PendingConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    id: ConnectionId,
    accepted_at: Instant,
}

impl PendingConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Time spent between accept and now.
    pub fn waited(&self) -> Duration {
        self.accepted_at.elapsed()
    }

    /// Complete the TLS handshake and wrap the stream as a [`Connection`].
    pub async fn establish(
        self,
        acceptor: &TlsAcceptor,
        idle_timeout: Duration,
        read_chunk: usize,
    ) -> Result<Connection<TlsStream>, HandshakeError> {
        let stream = accept_tls(acceptor, self.stream, idle_timeout).await?;
        Ok(Connection::new(
            stream,
            self.id,
            self.peer_addr,
            read_chunk,
            idle_timeout,
        ))
    }
}
