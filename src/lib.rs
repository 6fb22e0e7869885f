//! # Room Relay
//!
//! A volatile, room-scoped message relay. Clients hold a WebSocket open,
//! create or join a named room, and broadcast short text messages to everyone
//! else in that room. Nothing is persisted: a room lives exactly as long as it
//! has members.
//!
//! ## Features
//!
//! - **Room registry** — [`RoomRegistry`] tracks room membership and fans out
//!   events under a single lock
//! - **Typed wire protocol** — [`ClientMessage`] / [`ServerMessage`] are closed
//!   tagged enums; malformed frames are dropped at the session boundary
//! - **Transport-agnostic sessions** — implement [`Transport`] for any backend
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   [`WebSocketTransport`] and [`RelayServer`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), room_relay::RelayError> {
//! use room_relay::{RelayConfig, RelayServer};
//!
//! let mut server = RelayServer::start(RelayConfig::default().with_port(8080)).await?;
//! tokio::signal::ctrl_c().await?;
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod transports;

#[cfg(feature = "transport-websocket")]
pub mod server;

// Re-export primary types for ergonomic imports.
pub use config::RelayConfig;
pub use error::RelayError;
pub use protocol::{ClientMessage, RoomId, ServerMessage};
pub use registry::{ConnectionHandle, ConnectionId, RoomRegistry};
pub use session::{run_session, SessionEnd};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use server::RelayServer;
#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
