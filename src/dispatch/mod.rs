//! Connection dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop
//!     → queue.rs try_enqueue ──full──▶ connection dropped (rejected)
//!     → worker.rs (N workers, one connection each, serially)
//!     → http::session (full keep-alive lifetime)
//! ```
//!
//! # Design Decisions
//! - Enqueue never waits: overload is shed at accept time
//! - Queue capacity and worker count are fixed at construction
//! - Items are owned by exactly one worker; ownership ends with the iteration

pub mod queue;
pub mod worker;

pub use queue::{bounded, DispatchQueue, QueueReceiver, Rejected};
pub use worker::spawn_workers;
