//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] wraps the server side of an accepted WebSocket
//! connection and translates between relay text messages and WebSocket
//! frames.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is
//! enabled (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), room_relay::RelayError> {
//! use room_relay::{Transport, WebSocketTransport};
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! let (tcp, _peer) = listener.accept().await?;
//! let mut transport = WebSocketTransport::accept(tcp, 64 * 1024).await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     transport.send(msg).await?;
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};

use crate::error::RelayError;
use crate::transport::Transport;

/// Type alias for the underlying server-side WebSocket stream.
pub type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A [`Transport`] backed by an accepted WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe. Dropping its future before it
/// completes does not consume or lose a message.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Perform the WebSocket opening handshake on an accepted TCP stream.
    ///
    /// Frames and messages larger than `max_frame_size` bytes are rejected by
    /// tungstenite, which ends the connection with a receive error.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Handshake`] if the client does not complete a
    /// valid WebSocket upgrade.
    pub async fn accept(tcp: TcpStream, max_frame_size: usize) -> Result<Self, RelayError> {
        let config = WebSocketConfig::default()
            .max_message_size(Some(max_frame_size))
            .max_frame_size(Some(max_frame_size));

        let stream = tokio_tungstenite::accept_async_with_config(tcp, Some(config))
            .await
            .map_err(|e| RelayError::Handshake(e.to_string()))?;

        Ok(Self::from_stream(stream))
    }

    /// Create a [`WebSocketTransport`] from an already-upgraded stream.
    ///
    /// Use this when the upgrade happens elsewhere, e.g. behind custom header
    /// inspection with `accept_hdr_async`.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), RelayError> {
        if self.closed {
            return Err(RelayError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| RelayError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RelayError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(RelayError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| RelayError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    type ClientStream =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    /// Accept one connection as a [`WebSocketTransport`] and connect a plain
    /// tungstenite client to it.
    async fn connected_pair(max_frame_size: usize) -> (WebSocketTransport, ClientStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            WebSocketTransport::accept(tcp, max_frame_size)
                .await
                .unwrap()
        });

        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        (server.await.unwrap(), client)
    }

    #[tokio::test]
    async fn recv_receives_text_messages() {
        let (mut transport, mut client) = connected_pair(1024).await;

        client.send(Message::Text("hello".into())).await.unwrap();
        client.send(Message::Text("world".into())).await.unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
        assert_eq!(transport.recv().await.unwrap().unwrap(), "world");
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let (mut transport, mut client) = connected_pair(1024).await;

        client
            .send(Message::Binary(vec![0xDE, 0xAD].into()))
            .await
            .unwrap();
        client
            .send(Message::Text("after_binary".into()))
            .await
            .unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), "after_binary");
    }

    #[tokio::test]
    async fn recv_returns_none_on_client_close() {
        let (mut transport, mut client) = connected_pair(1024).await;

        client.close(None).await.unwrap();

        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn oversized_message_is_a_receive_error() {
        let (mut transport, mut client) = connected_pair(16).await;

        client
            .send(Message::Text("x".repeat(64).into()))
            .await
            .unwrap();

        let result = transport.recv().await;
        assert!(matches!(result, Some(Err(RelayError::TransportReceive(_)))));
    }

    #[tokio::test]
    async fn send_reaches_client() {
        let (mut transport, mut client) = connected_pair(1024).await;

        transport.send("to_client".to_string()).await.unwrap();

        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::Text("to_client".into()));
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let (mut transport, _client) = connected_pair(1024).await;

        transport.close().await.unwrap();
        // Second close is a no-op.
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, RelayError::TransportClosed));
    }

    #[tokio::test]
    async fn accept_rejects_plain_tcp_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut tcp = TcpStream::connect(addr).await.unwrap();
            tcp.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
                .await
                .unwrap();
            tcp
        });

        let (tcp, _) = listener.accept().await.unwrap();
        let result = WebSocketTransport::accept(tcp, 1024).await;
        assert!(matches!(result, Err(RelayError::Handshake(_))));
        drop(client.await.unwrap());
    }
}
