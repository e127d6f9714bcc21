//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Decoded Request (path)
//!     → router.rs (exact lookup)
//!     → Return: Handler or NoMatch (404)
//!
//! Route registration (at startup):
//!     add_route(pattern, handler)...
//!     → Router moved into the server
//!     → Frozen behind Arc, read-only from then on
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable at runtime
//! - Byte-exact path matching only
//! - Deterministic: same input always matches same route

pub mod router;

pub use router::{Handler, Router};
