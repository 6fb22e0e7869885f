//! WebSocket relay server.
//!
//! [`RelayServer::start`] binds the listener and spawns a background accept
//! loop. Every accepted socket is upgraded to a [`WebSocketTransport`] and
//! driven by its own [`run_session`] task, all sharing one [`RoomRegistry`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), room_relay::RelayError> {
//! use room_relay::{RelayConfig, RelayServer};
//!
//! let mut server = RelayServer::start(RelayConfig::from_env()).await?;
//! println!("listening on {}", server.local_addr());
//!
//! tokio::signal::ctrl_c().await?;
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::registry::RoomRegistry;
use crate::session::run_session;
use crate::transports::WebSocketTransport;

/// Pause after a failed `accept` so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Handle to a running relay server.
///
/// Dropping the handle aborts the accept loop and every open session. Call
/// [`shutdown`](Self::shutdown) to close client connections gracefully.
pub struct RelayServer {
    local_addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    shutdown_timeout: Duration,
}

impl RelayServer {
    /// Bind to the configured address and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the address cannot be bound.
    pub async fn start(config: RelayConfig) -> Result<Self> {
        let addr = config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "room relay listening");

        let registry = Arc::new(RoomRegistry::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_timeout = config.shutdown_timeout;

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&registry),
            config,
            shutdown_rx,
        ));

        Ok(Self {
            local_addr,
            registry,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The registry shared by every session of this server.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Stop accepting, close every open session, and wait for them to finish.
    ///
    /// If that takes longer than the configured shutdown timeout, the
    /// remaining tasks are aborted.
    pub async fn shutdown(&mut self) {
        debug!("RelayServer: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("accept loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("accept loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("accept loop aborted: {join_err}");
                    }
                }
            }
        }

        info!(addr = %self.local_addr, "room relay stopped");
    }
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("local_addr", &self.local_addr)
            .field("running", &self.task.is_some())
            .finish()
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        // Aborting the accept loop drops its JoinSet, which aborts every session.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Accept loop ─────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
    config: RelayConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((tcp, peer)) => {
                        debug!(%peer, "accepted TCP connection");
                        sessions.spawn(serve_connection(
                            tcp,
                            peer,
                            Arc::clone(&registry),
                            config.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }

            Some(joined) = sessions.join_next() => {
                if let Err(join_err) = joined {
                    warn!("session task failed: {join_err}");
                }
            }

            _ = shutdown.changed() => {
                debug!(open_sessions = sessions.len(), "accept loop stopping");
                break;
            }
        }
    }

    drop(listener);
    while let Some(joined) = sessions.join_next().await {
        if let Err(join_err) = joined {
            warn!("session task failed during shutdown: {join_err}");
        }
    }
    debug!("accept loop exited");
}

async fn serve_connection(
    tcp: tokio::net::TcpStream,
    peer: SocketAddr,
    registry: Arc<RoomRegistry>,
    config: RelayConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let transport = tokio::select! {
        upgraded = WebSocketTransport::accept(tcp, config.max_frame_size) => match upgraded {
            Ok(transport) => transport,
            Err(e) => {
                warn!(%peer, "rejecting connection: {e}");
                return;
            }
        },
        _ = shutdown.changed() => return,
    };

    let (id, end) = run_session(transport, registry, config.outbox_capacity, shutdown).await;
    debug!(%peer, connection = %id, ?end, "connection finished");
}
