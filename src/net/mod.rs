//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, PendingConnection)
//!     → [dispatch: queue or task]
//!     → tls.rs (TLS handshake, bounded by the idle timeout)
//!     → connection.rs (bounded reads, deadline, state machine)
//!     → Hand off to HTTP layer
//!
//! Connection States:
//!     Idle → Reading → Decoding → Routing → Responding → Idle ... → Closed
//! ```
//!
//! # Design Decisions
//! - The accept loop never performs a handshake; a slow client cannot stall it
//! - Rejected connections are dropped before any TLS byte is sent
//! - Every read is bounded by a deadline that is always set while open

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{
    Connection, ConnectionGuard, ConnectionId, ConnectionState, ConnectionTracker, ReadError,
};
pub use listener::{Listener, ListenerError, PendingConnection};
pub use tls::{load_tls_acceptor, tls_acceptor_from_pem, HandshakeError, TlsError, TlsStream};
