//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Connection ID flows through every per-connection log event
//! - Client address (X-Forwarded-For / X-Real-IP / peer) is logged, never trusted
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
