//! Connection wrapper, state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Own one transport stream and its read deadline
//! - Perform single bounded reads into a fixed scratch buffer
//! - Track connection state (Idle → Reading → ... → Closed)
//! - Generate unique connection IDs for tracing
//! - Count active and rejected connections

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Upper bound on waiting for the peer during a close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Processing state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the first byte of the next request.
    Idle,
    /// Accumulating request bytes.
    Reading,
    Decoding,
    Routing,
    /// Composing and writing the response.
    Responding,
    Closed,
}

/// Failure of a single [`Connection::read`].
#[derive(Debug, Error)]
pub enum ReadError {
    /// The peer closed its side of the stream.
    #[error("end of stream")]
    EndOfStream,

    /// No bytes arrived before the read deadline.
    #[error("read deadline exceeded")]
    TimedOut,

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One live transport stream, owned by exactly one task.
pub struct Connection<S> {
    stream: S,
    id: ConnectionId,
    peer_addr: SocketAddr,
    scratch: Box<[u8]>,
    read_deadline: Instant,
    state: ConnectionState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream. The read deadline starts at `now + idle_timeout`.
    pub fn new(
        stream: S,
        id: ConnectionId,
        peer_addr: SocketAddr,
        read_chunk: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            id,
            peer_addr,
            scratch: vec![0u8; read_chunk.max(1)].into_boxed_slice(),
            read_deadline: Instant::now() + idle_timeout,
            state: ConnectionState::Idle,
        }
    }

    /// Perform one read of at most `read_chunk` bytes, bounded by the read deadline.
    ///
    /// The returned bytes may be a partial request.
    pub async fn read(&mut self) -> Result<&[u8], ReadError> {
        if !self.is_open() {
            return Err(ReadError::EndOfStream);
        }

        let result =
            tokio::time::timeout_at(self.read_deadline, self.stream.read(&mut self.scratch)).await;

        match result {
            Err(_) => Err(ReadError::TimedOut),
            Ok(Ok(0)) => Err(ReadError::EndOfStream),
            Ok(Ok(n)) => Ok(&self.scratch[..n]),
            // TLS peers that skip close_notify surface as an unexpected EOF.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ReadError::EndOfStream)
            }
            Ok(Err(e)) => Err(ReadError::Io(e)),
        }
    }

    /// Write all bytes and flush them to the transport.
    pub async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if !self.is_open() {
            return Err(std::io::ErrorKind::NotConnected.into());
        }
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    pub fn set_read_deadline(&mut self, deadline: Instant) {
        self.read_deadline = deadline;
    }

    pub fn read_deadline(&self) -> Instant {
        self.read_deadline
    }

    /// Shut the stream down. Safe to call more than once; errors are ignored.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.set_state(ConnectionState::Closed);
        let _ = tokio::time::timeout(CLOSE_GRACE, self.stream.shutdown()).await;
    }

    pub fn is_open(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::trace!(connection_id = %self.id, from = ?self.state, to = ?state, "Connection state");
            self.state = state;
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// Tracks active and rejected connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Connections currently owned by a worker or task.
    active_count: Arc<AtomicU64>,
    /// Connections closed on arrival because the dispatch queue was full.
    rejected_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection entering processing. Returns a guard that decrements on drop.
    pub fn track(&self, id: ConnectionId) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened();
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    pub fn record_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::SeqCst);
        metrics::record_rejected();
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::SeqCst)
    }

    /// Wait until no connection is being processed.
    pub async fn wait_idle(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Guard that tracks a connection's processing lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}
