//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)           CLI flags
//!     → loader.rs (parse)          │
//!     → overrides applied ◀────────┘
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → consumed once by Server::new
//! ```
//!
//! # Design Decisions
//! - Config is fixed for the process lifetime; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    DispatchConfig, DispatchMode, LimitsConfig, ListenerConfig, ObservabilityConfig, PoolConfig,
    ServerConfig, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
