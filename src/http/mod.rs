//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection (from dispatch)
//!     → session.rs (read until one request is framed)
//!     → request.rs (decode method, path, version, headers, body)
//!     → routing::Router (exact path → handler, or 404)
//!     → writer.rs (handler fills status, headers, body)
//!     → response.rs (compose wire bytes into a pooled buffer)
//!     → write, reset idle deadline, repeat
//! ```
//!
//! # Design Decisions
//! - HTTP/1.1 only, one request in flight per connection
//! - Content-Length and Date are always written by the composer

pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod writer;

pub use request::{decode, DecodeError, Request};
pub use response::{ComposedResponse, ResponseComposer};
pub use server::{Server, ServerError};
pub use session::{CloseReason, SessionContext};
pub use writer::ResponseWriter;
