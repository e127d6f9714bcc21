//! Server setup and accept loop.
//!
//! # Responsibilities
//! - Own the TLS acceptor, router, pools and dispatch settings
//! - Accept connections and hand them to workers (pooled) or tasks (per connection)
//! - Shed load when the dispatch queue is full
//! - Stop accepting on shutdown and drain in-flight connections
//!
//! # Design Decisions
//! - The accept loop never waits: enqueue is non-blocking and the TLS handshake
//!   runs on the worker
//! - A rejected connection is dropped before any TLS byte is exchanged
//! - Both deployment modes share the per-connection processing path

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinError;
use tokio_rustls::TlsAcceptor;

use crate::config::{validate_config, ConfigError, DispatchMode, ServerConfig};
use crate::dispatch::{self, Rejected};
use crate::http::session::{self, SessionContext};
use crate::net::{ConnectionGuard, ConnectionTracker, Listener, PendingConnection};
use crate::routing::Router;

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid server configuration: {0}")]
    Config(#[source] ConfigError),

    #[error("worker task failed: {0}")]
    Worker(#[from] JoinError),
}

/// State shared by every connection the server processes.
struct Shared {
    context: SessionContext,
    acceptor: TlsAcceptor,
    tracker: ConnectionTracker,
}

/// TLS-terminating HTTP/1.1 server.
pub struct Server {
    shared: Arc<Shared>,
    mode: DispatchMode,
    workers: usize,
    queue_capacity: usize,
    version: String,
}

impl Server {
    /// Create a server. Configuration is validated here and fixed for the
    /// server's lifetime.
    pub fn new(
        config: &ServerConfig,
        acceptor: TlsAcceptor,
        router: Router,
        version: impl Into<String>,
    ) -> Result<Self, ServerError> {
        validate_config(config).map_err(|errors| ServerError::Config(ConfigError::Validation(errors)))?;

        let shared = Shared {
            context: SessionContext::new(config, router),
            acceptor,
            tracker: ConnectionTracker::new(),
        };
        Ok(Self {
            shared: Arc::new(shared),
            mode: config.dispatch.mode,
            workers: config.dispatch.workers,
            queue_capacity: config.dispatch.queue_capacity,
            version: version.into(),
        })
    }

    /// Connection counters. Clones observe the running server.
    pub fn tracker(&self) -> ConnectionTracker {
        self.shared.tracker.clone()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Accept connections on `listener` until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(
            address = %listener.local_addr(),
            version = %self.version,
            mode = %self.mode,
            workers = self.workers,
            queue_capacity = self.queue_capacity,
            routes = self.shared.context.router.len(),
            "Server starting"
        );

        match self.mode {
            DispatchMode::Pooled => self.run_pooled(&listener, &mut shutdown).await?,
            DispatchMode::PerConnection => self.run_per_connection(&listener, &mut shutdown).await,
        }

        tracing::info!("Server stopped");
        Ok(())
    }

    async fn run_pooled(
        &self,
        listener: &Listener,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let (queue, receiver) = dispatch::bounded(self.queue_capacity);

        let shared = Arc::clone(&self.shared);
        let workers = dispatch::spawn_workers(self.workers, receiver, move |pending: PendingConnection| {
            let shared = Arc::clone(&shared);
            async move {
                let guard = shared.tracker.track(pending.id());
                serve_pending(pending, guard, &shared).await;
            }
        });

        accept_until_shutdown(listener, shutdown, |pending| {
            if let Err(rejected) = queue.try_enqueue(pending) {
                let reason = match &rejected {
                    Rejected::Full(_) => "queue full",
                    Rejected::Closed(_) => "queue closed",
                };
                let pending = rejected.into_inner();
                self.shared.tracker.record_rejected();
                tracing::warn!(
                    connection_id = %pending.id(),
                    peer_addr = %pending.peer_addr(),
                    capacity = queue.capacity(),
                    reason,
                    "Rejecting connection"
                );
            }
        })
        .await;

        tracing::info!(queued = queue.len(), "Draining dispatch queue");
        drop(queue);
        for worker in workers {
            worker.await?;
        }
        Ok(())
    }

    async fn run_per_connection(&self, listener: &Listener, shutdown: &mut broadcast::Receiver<()>) {
        accept_until_shutdown(listener, shutdown, |pending| {
            let guard = self.shared.tracker.track(pending.id());
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                serve_pending(pending, guard, &shared).await;
            });
        })
        .await;

        tracing::info!(
            active = self.shared.tracker.active_count(),
            "Waiting for active connections"
        );
        self.shared.tracker.wait_idle().await;
    }
}

async fn accept_until_shutdown<F>(
    listener: &Listener,
    shutdown: &mut broadcast::Receiver<()>,
    mut on_accept: F,
) where
    F: FnMut(PendingConnection),
{
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received, no longer accepting");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(pending) => on_accept(pending),
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Complete the handshake and run the connection to completion.
async fn serve_pending(pending: PendingConnection, _guard: ConnectionGuard, shared: &Shared) {
    let id = pending.id();
    let peer_addr = pending.peer_addr();
    tracing::trace!(
        connection_id = %id,
        waited_ms = pending.waited().as_millis() as u64,
        "Connection dequeued"
    );

    let ctx = &shared.context;
    let mut conn = match pending
        .establish(&shared.acceptor, ctx.idle_timeout, ctx.read_chunk)
        .await
    {
        Ok(conn) => conn,
        Err(e) => {
            tracing::debug!(connection_id = %id, peer_addr = %peer_addr, error = %e, "TLS handshake failed");
            return;
        }
    };

    session::serve(&mut conn, ctx).await;
}
