//! TCP server: listener, accept loop, and shutdown coordination

pub mod config;
pub(crate) mod connection;

pub use config::ServerConfig;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, timeout};

use crate::error::ServerError;
use crate::registry::Registry;
use crate::timecode::Framerate;

/// The timecode synchronization server.
///
/// [`bind`](TimecodeServer::bind) acquires the listener (so bind failures
/// surface before anything is spawned), then [`serve`](TimecodeServer::serve)
/// runs the accept loop until a [`ServerHandle`] requests shutdown.
#[derive(Debug)]
pub struct TimecodeServer {
    config: ServerConfig,
    listener: TcpListener,
    registry: Arc<Registry>,
    kick_rx: mpsc::UnboundedReceiver<String>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for requesting a graceful shutdown.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::Sender<()>,
}

impl ServerHandle {
    /// Ask the server to shut down. Idempotent; returns once the request
    /// is delivered, not once shutdown completes.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(()).await;
    }
}

impl TimecodeServer {
    /// Bind the configured listen address.
    ///
    /// # Errors
    /// [`ServerError::Bind`] when the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let (registry, kick_rx) = Registry::new();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tracing::info!(addr = %listener.local_addr()?, "timecode server listening");
        tracing::info!(framerates = ?Framerate::supported_keys(), "supported framerates");

        Ok(Self {
            config,
            listener,
            registry,
            kick_rx,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// The bound address (useful with port 0).
    ///
    /// # Errors
    /// Propagates the socket's local-address lookup failure.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// A shutdown handle for this server.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run the accept loop until shutdown is requested, then stop every
    /// session, notify and close every client, and wait (bounded by the
    /// shutdown deadline) for connection handlers to drain.
    ///
    /// # Errors
    /// Currently only fails on listener-level I/O faults during setup;
    /// per-connection faults are handled inside their handlers.
    pub async fn serve(self) -> Result<(), ServerError> {
        let Self {
            config,
            listener,
            registry,
            mut kick_rx,
            shutdown_tx: _shutdown_keepalive,
            mut shutdown_rx,
        } = self;

        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);

        // Reaper: disconnects members dropped by the slow-consumer policy.
        let reaper = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                while let Some(client_id) = kick_rx.recv().await {
                    registry.on_client_disconnect(&client_id).await;
                }
            })
        };

        let reporter = config.status_reporting.then(|| {
            let registry = Arc::clone(&registry);
            let mut shutdown = conn_shutdown_rx.clone();
            let period = config.status_interval;
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.tick().await; // the immediate first tick
                loop {
                    tokio::select! {
                        _ = ticker.tick() => report_status(&registry).await,
                        _ = shutdown.changed() => break,
                    }
                }
            })
        });

        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        handlers.spawn(connection::handle_client(
                            stream,
                            peer,
                            Arc::clone(&registry),
                            config.channel_capacity,
                            config.max_line_len,
                            conn_shutdown_rx.clone(),
                        ));
                    }
                    Err(err) => tracing::error!(%err, "accept failed"),
                },
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::info!("shutting down");
        drop(listener);
        registry.shutdown().await;
        let _ = conn_shutdown_tx.send(true);

        let drained = timeout(config.shutdown_deadline, async {
            while handlers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("connection handlers outlived the shutdown deadline, aborting");
            handlers.abort_all();
            while handlers.join_next().await.is_some() {}
        }

        if let Some(task) = reporter {
            let _ = task.await;
        }
        reaper.abort();

        tracing::info!("timecode server stopped");
        Ok(())
    }
}

async fn report_status(registry: &Registry) {
    let status = registry.status().await;
    if status.client_count == 0 && status.sessions.is_empty() {
        return;
    }
    tracing::info!(
        clients = status.client_count,
        sessions = status.sessions.len(),
        "status"
    );
    for session in &status.sessions {
        tracing::info!(
            session = %&session.id[..8],
            framerate = session.framerate,
            running = session.running,
            timecode = %session.timecode,
            members = session.member_count,
            uptime_secs = session.uptime.as_secs(),
            "session status"
        );
    }
}
