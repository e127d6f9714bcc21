//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "0.0.0.0:443"
            tls = { cert_path = "/etc/tls/cert.pem", key_path = "/etc/tls/key.pem" }

            [dispatch]
            workers = 8
            queue_capacity = 16

            [timeouts]
            idle_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.tls.key_path, "/etc/tls/key.pem");
        assert_eq!(config.dispatch.workers, 8);
        assert_eq!(config.dispatch.queue_capacity, 16);
        assert_eq!(config.timeouts.idle_ms, 1000);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = parse_config("[dispatch]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("dispatch.workers"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = parse_config("[dispatch\nworkers = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/https-server.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
