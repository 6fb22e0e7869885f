#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Room Relay integration tests.
//!
//! Provides a channel-based [`MockTransport`] that a test drives from the
//! client side, plus helpers for building client frames and connecting
//! registry handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use room_relay::protocol::{ClientMessage, ServerMessage};
use room_relay::{ConnectionHandle, ConnectionId, RelayError, Transport};
use tokio::sync::mpsc;

/// How long a test waits for an expected frame before failing.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a test waits to be confident nothing else is coming.
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

// ── MockTransport ───────────────────────────────────────────────────

/// Server-side half of an in-process connection.
///
/// Frames pushed through the paired [`MockClient`] come out of `recv()`.
/// Dropping the client's inbound sender makes `recv()` return `None`, just
/// like a client closing its socket.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, RelayError>>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// Client-side half of an in-process connection.
pub struct MockClient {
    /// Frames for the server to receive. Drop it to close the connection.
    pub tx: Option<mpsc::UnboundedSender<Result<String, RelayError>>>,
    /// Frames the server sent.
    pub rx: mpsc::UnboundedReceiver<String>,
    /// Whether the server called `close()`.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a connected `(transport, client)` pair.
    pub fn pair() -> (Self, MockClient) {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: server_rx,
            outgoing: server_tx,
            closed: Arc::clone(&closed),
        };
        let client = MockClient {
            tx: Some(client_tx),
            rx: client_rx,
            closed,
        };
        (transport, client)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), RelayError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(RelayError::TransportClosed);
        }
        self.outgoing
            .send(message)
            .map_err(|e| RelayError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RelayError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl MockClient {
    /// Send a raw text frame to the server.
    pub fn send_raw(&self, text: impl Into<String>) {
        self.tx
            .as_ref()
            .expect("client already closed")
            .send(Ok(text.into()))
            .unwrap();
    }

    /// Send a typed client message.
    pub fn send(&self, message: &ClientMessage) {
        self.send_raw(serde_json::to_string(message).unwrap());
    }

    /// Inject a transport receive error.
    pub fn fail(&self, reason: &str) {
        self.tx
            .as_ref()
            .expect("client already closed")
            .send(Err(RelayError::TransportReceive(reason.into())))
            .unwrap();
    }

    /// Close the connection from the client side.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Wait for the next server frame and parse it.
    pub async fn next(&mut self) -> ServerMessage {
        let text = tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for server message")
            .expect("server side dropped");
        serde_json::from_str(&text).expect("server sent invalid JSON")
    }

    /// Assert that no frame arrives within [`QUIET_PERIOD`].
    pub async fn assert_silent(&mut self) {
        if let Ok(Some(text)) = tokio::time::timeout(QUIET_PERIOD, self.rx.recv()).await {
            panic!("expected no message, got {text}");
        }
    }
}

// ── Registry helpers ────────────────────────────────────────────────

/// A registry-level connection: a handle plus the receiving end of its outbox.
pub fn handle(n: u128) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(64);
    (ConnectionHandle::with_id(ConnectionId::from_u128(n), tx), rx)
}

/// Collect every event currently queued in an outbox.
pub fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

// ── Message builders ────────────────────────────────────────────────

pub fn create(room: &str) -> ClientMessage {
    ClientMessage::Create {
        room_id: room.into(),
    }
}

pub fn join(room: &str) -> ClientMessage {
    ClientMessage::Join {
        room_id: room.into(),
    }
}

pub fn chat(room: &str, text: &str, name: &str) -> ClientMessage {
    ClientMessage::Message {
        room_id: room.into(),
        message: text.into(),
        name: name.into(),
    }
}

pub fn count(n: usize) -> ServerMessage {
    ServerMessage::Count { count: n }
}

pub fn relayed(text: &str, name: &str) -> ServerMessage {
    ServerMessage::Message {
        message: text.into(),
        name: name.into(),
    }
}
