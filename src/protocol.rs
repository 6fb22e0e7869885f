//! Wire protocol for the room relay.
//!
//! Every frame is a JSON object with a `type` discriminator and a `payload`
//! body:
//!
//! ```json
//! {"type": "join", "payload": {"roomId": "abc"}}
//! ```
//!
//! Inbound frames parse into [`ClientMessage`]; anything that does not match
//! one of its variants is rejected at the session boundary and never reaches
//! the registry.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

// ── Type aliases ────────────────────────────────────────────────────

/// Room identifier, chosen by the client that creates the room.
pub type RoomId = String;

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
///
/// Transport closure has no variant here; it is signaled by the transport
/// itself and handled as a disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Create an empty room. Does not join it.
    Create {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    /// Join a room, leaving the current one. Creates the room if missing.
    Join {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    /// Broadcast a text message to the other members of a room.
    Message {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Message body.
        message: String,
        /// Sender display name.
        name: String,
    },
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ServerMessage {
    /// A request from this connection failed.
    Error { message: String },
    /// Live member count of the room this connection belongs to.
    Count { count: usize },
    /// A message relayed from another member of the room.
    Message { message: String, name: String },
}

impl ServerMessage {
    /// Short name of the variant, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::Count { .. } => "count",
            Self::Message { .. } => "message",
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ClientMessage {
    /// Parse one JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if `text` is not a valid client
    /// message.
    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Short name of the variant, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Join { .. } => "join",
            Self::Message { .. } => "message",
        }
    }
}
