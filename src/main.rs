//! TLS-terminating HTTP/1.1 request server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TCP──▶ net::Listener ──▶ dispatch queue ──full──▶ dropped
//!                                           │
//!                                           ▼
//!                                    worker (N fixed)
//!                                           │
//!                           TLS handshake (net::tls, idle-bounded)
//!                                           │
//!                                           ▼
//!                 http::session ◀──────── keep-alive loop ────────┐
//!                     │ read → decode → route → handle → compose  │
//!                     └──────────── write, reset deadline ────────┘
//!
//!     Cross-cutting: config, pool, observability, lifecycle
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use https_server::config::{load_config, validate_config, ConfigError, DispatchMode, ServerConfig};
use https_server::lifecycle::{self, signals, Shutdown};
use https_server::observability::{logging, metrics};
use https_server::{Request, ResponseWriter, Router};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "https-server")]
#[command(version, about = "TLS-terminating HTTP/1.1 request server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address as host:port
    #[arg(long)]
    bind: Option<String>,

    /// Certificate chain (PEM)
    #[arg(long)]
    cert: Option<String>,

    /// Private key (PEM)
    #[arg(long)]
    key: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Spawn a task per connection instead of using the worker pool
    #[arg(long)]
    per_connection: bool,

    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(cert) = self.cert {
            config.listener.tls.cert_path = cert;
        }
        if let Some(key) = self.key {
            config.listener.tls.key_path = key;
        }
        if let Some(workers) = self.workers {
            config.dispatch.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.dispatch.queue_capacity = capacity;
        }
        if self.per_connection {
            config.dispatch.mode = DispatchMode::PerConnection;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = VERSION, "https-server starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let started = lifecycle::start(&config, demo_routes(), VERSION).await?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    started.server.run(started.listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn demo_routes() -> Router {
    Router::new()
        .route("/", |_: &Request, res: &mut ResponseWriter| {
            res.set_header("Content-Type", "text/plain; charset=utf-8");
            res.write(b"Hello from https-server\n");
        })
        .route("/health", |_: &Request, res: &mut ResponseWriter| {
            let body = serde_json::json!({ "status": "ok", "version": VERSION });
            res.set_header("Content-Type", "application/json");
            res.write(body.to_string().as_bytes());
        })
        .route("/echo", |req: &Request, res: &mut ResponseWriter| {
            let content_type = req
                .header("Content-Type")
                .unwrap_or("application/octet-stream")
                .to_string();
            res.set_header("Content-Type", content_type);
            res.write(req.body());
        })
}
