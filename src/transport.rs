//! Transport abstraction for relay connections.
//!
//! The [`Transport`] trait is one bidirectional text message channel between
//! the server and a single client. The relay speaks JSON text frames, so every
//! implementation must handle message framing internally (WebSocket frames,
//! length-prefixed TCP, in-process channels for tests).
//!
//! Accepting connections is NOT part of this trait. The server accepts and
//! upgrades a socket, wraps it in a transport, and hands that to
//! [`run_session`](crate::session::run_session).
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use room_relay::error::RelayError;
//! use room_relay::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), RelayError> {
//!         // Write one JSON text message to the client
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RelayError>> {
//!         // Read the next JSON text message from the client
//!         // Return None once the client has gone away
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RelayError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RelayError;

/// A bidirectional text message transport to one client.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the session loop calls
/// it inside `tokio::select!`, and a cancelled `recv` must not lose a message.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text message to the client.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportSend`] if the message could not be
    /// written, or [`RelayError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), RelayError>;

    /// Receive the next JSON text message from the client.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the client closed the connection
    async fn recv(&mut self) -> Option<Result<String, RelayError>>;

    /// Close the connection. Calling it twice must be harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// either way.
    async fn close(&mut self) -> Result<(), RelayError>;
}
