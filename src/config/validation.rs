//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, sizes ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{DispatchMode, ServerConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(message) = check_host_port(&config.listener.bind_address) {
        errors.push(ValidationError::new("listener.bind_address", message));
    }
    if config.listener.tls.cert_path.trim().is_empty() {
        errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
    }
    if config.listener.tls.key_path.trim().is_empty() {
        errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
    }

    if config.dispatch.mode == DispatchMode::Pooled {
        if config.dispatch.workers == 0 {
            errors.push(ValidationError::new("dispatch.workers", "must be at least 1"));
        }
        if config.dispatch.queue_capacity == 0 {
            errors.push(ValidationError::new("dispatch.queue_capacity", "must be at least 1"));
        }
    }

    if config.timeouts.idle_ms == 0 {
        errors.push(ValidationError::new("timeouts.idle_ms", "must be greater than 0"));
    }

    if config.limits.read_chunk_bytes == 0 {
        errors.push(ValidationError::new("limits.read_chunk_bytes", "must be greater than 0"));
    }
    if config.limits.max_request_bytes < config.limits.read_chunk_bytes {
        errors.push(ValidationError::new(
            "limits.max_request_bytes",
            format!(
                "must be at least read_chunk_bytes ({})",
                config.limits.read_chunk_bytes
            ),
        ));
    }

    if config.pools.max_idle == 0 {
        errors.push(ValidationError::new("pools.max_idle", "must be at least 1"));
    }

    // The exporter binds a socket address directly; host names are not resolved.
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "expected ip:port, got {:?}",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_host_port(address: &str) -> Result<(), String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port, got {:?}", address))?;
    port.parse::<u16>()
        .map_err(|_| format!("invalid port {:?}", port))?;
    // An empty host binds every interface, matching ":443".
    if host.contains(char::is_whitespace) {
        return Err(format!("invalid host {:?}", host));
    }
    Ok(())
}
