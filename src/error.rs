//! Error types for the room relay.

use thiserror::Error;

/// Errors that can occur while running the relay.
///
/// None of these are fatal to the process: a per-connection error ends that
/// connection's session and nothing else.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was already closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The WebSocket opening handshake with a client failed.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// The listener could not be bound to the configured address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the server tried to listen on.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
