//! Startup orchestration.
//!
//! # Responsibilities
//! - Load TLS material
//! - Build the server from configuration and routes
//! - Bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last (traffic only when ready)

use std::path::Path;

use crate::config::ServerConfig;
use crate::http::{Server, ServerError};
use crate::net::{load_tls_acceptor, Listener, ListenerError, TlsError};
use crate::routing::Router;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load TLS material: {0}")]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Bind(#[from] ListenerError),
}

/// A server ready to run, and the listener it will accept on.
pub struct Started {
    pub server: Server,
    pub listener: Listener,
}

/// Load TLS material, build the server and bind its listener.
pub async fn start(
    config: &ServerConfig,
    router: Router,
    version: &str,
) -> Result<Started, StartupError> {
    let tls = &config.listener.tls;
    let acceptor = load_tls_acceptor(Path::new(&tls.cert_path), Path::new(&tls.key_path))?;
    tracing::info!(cert_path = %tls.cert_path, "TLS material loaded");

    let server = Server::new(config, acceptor, router, version)?;
    let listener = Listener::bind(&config.listener.bind_address).await?;

    Ok(Started { server, listener })
}
