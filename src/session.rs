//! Per-connection session loop.
//!
//! [`run_session`] owns one client's [`Transport`] for its whole life. It
//! multiplexes three sources with `tokio::select!`:
//!
//! - inbound frames, parsed into [`ClientMessage`] and handed to the registry
//! - the connection's outbox, serialized and written to the transport
//! - the server-wide shutdown signal
//!
//! Whatever ends the loop, the connection is removed from the registry
//! exactly once on the way out. That includes the session future being
//! dropped mid-flight, as happens when the server aborts its connection tasks.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionHandle, ConnectionId, RoomRegistry};
use crate::transport::Transport;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection.
    ClientClosed,
    /// Reading from or writing to the transport failed.
    TransportError(String),
    /// The server is shutting down.
    Shutdown,
}

/// Drive one connection until it closes, fails, or the server shuts down.
///
/// `outbox_capacity` bounds the number of undelivered events queued for this
/// connection; see [`RelayConfig::outbox_capacity`](crate::config::RelayConfig::outbox_capacity).
/// `shutdown` ends the session when its value changes or its sender is
/// dropped.
pub async fn run_session(
    mut transport: impl Transport,
    registry: Arc<RoomRegistry>,
    outbox_capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) -> (ConnectionId, SessionEnd) {
    // tokio panics on a zero-capacity channel.
    let (outbox_tx, mut outbox) = mpsc::channel::<ServerMessage>(outbox_capacity.max(1));
    let connection = ConnectionHandle::new(outbox_tx);
    let id = connection.id();
    info!(connection = %id, "session started");
    let mut cleanup = DisconnectOnDrop::new(Arc::clone(&registry), id);

    let already_shutting_down = *shutdown.borrow();
    let end = if already_shutting_down {
        if let Err(e) = transport.close().await {
            debug!(connection = %id, "close during shutdown failed: {e}");
        }
        SessionEnd::Shutdown
    } else {
        loop {
            tokio::select! {
                // `connection` holds a sender, so the outbox never reports closed.
                Some(message) = outbox.recv() => {
                    if let Err(end) = write(&mut transport, id, &message).await {
                        break end;
                    }
                }

                _ = shutdown.changed() => {
                    debug!(connection = %id, "shutdown signal received");
                    if let Err(e) = transport.close().await {
                        debug!(connection = %id, "close during shutdown failed: {e}");
                    }
                    break SessionEnd::Shutdown;
                }

                incoming = transport.recv() => {
                    match incoming {
                        Some(Ok(text)) => handle_frame(&registry, &connection, &text).await,
                        Some(Err(e)) => {
                            error!(connection = %id, "transport receive error: {e}");
                            break SessionEnd::TransportError(e.to_string());
                        }
                        None => {
                            debug!(connection = %id, "client closed connection");
                            break SessionEnd::ClientClosed;
                        }
                    }
                }
            }
        }
    };

    registry.disconnect(id).await;
    cleanup.disarm();
    info!(connection = %id, ?end, "session ended");
    (id, end)
}

/// Disconnects a connection whose session future was dropped before it could
/// clean up after itself.
struct DisconnectOnDrop {
    registry: Arc<RoomRegistry>,
    id: ConnectionId,
    armed: bool,
}

impl DisconnectOnDrop {
    fn new(registry: Arc<RoomRegistry>, id: ConnectionId) -> Self {
        Self {
            registry,
            id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(connection = %id, "session cancelled, disconnecting");
                let registry = Arc::clone(&self.registry);
                handle.spawn(async move { registry.disconnect(id).await });
            }
            Err(_) => {
                warn!(connection = %id, "session dropped outside a runtime; registry not updated");
            }
        }
    }
}

async fn write(
    transport: &mut impl Transport,
    id: ConnectionId,
    message: &ServerMessage,
) -> Result<(), SessionEnd> {
    match send_json(transport, message).await {
        Ok(()) => Ok(()),
        // Outbound types are plain strings and integers; this is a bug, not
        // a reason to drop the client.
        Err(e @ RelayError::Serialization(_)) => {
            error!(connection = %id, kind = message.kind(), "failed to encode ServerMessage: {e}");
            Ok(())
        }
        Err(e) => {
            error!(connection = %id, "transport send error: {e}");
            Err(SessionEnd::TransportError(e.to_string()))
        }
    }
}

async fn send_json(
    transport: &mut impl Transport,
    message: &ServerMessage,
) -> Result<(), RelayError> {
    let json = message.to_json()?;
    transport.send(json).await
}

/// Parse one inbound frame and route it to the registry. Malformed frames are
/// logged and dropped; the session carries on.
async fn handle_frame(registry: &RoomRegistry, connection: &ConnectionHandle, text: &str) {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(connection = %connection.id(), "dropping malformed client message: {e}");
            return;
        }
    };
    debug!(connection = %connection.id(), kind = message.kind(), "client message");

    match message {
        ClientMessage::Create { room_id } => registry.create(connection, room_id).await,
        ClientMessage::Join { room_id } => registry.join(connection, room_id).await,
        ClientMessage::Message {
            room_id,
            message,
            name,
        } => registry.message(connection, &room_id, message, name).await,
    }
}
