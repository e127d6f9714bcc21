//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config (validated) → Load TLS material → Build server → Bind listener
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain queued and active connections → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then TLS, then listener
//! - Draining is bounded: every connection is bounded by the idle timeout

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, Started, StartupError};
