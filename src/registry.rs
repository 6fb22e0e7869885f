//! Room registry and broadcaster.
//!
//! [`RoomRegistry`] owns the mapping from room identifier to member
//! connections plus the reverse index from connection to room. All state sits
//! behind one [`tokio::sync::Mutex`]; each operation takes the lock once,
//! mutates, and pushes its outbound events before releasing it, so a recipient
//! set can never change between being computed and being delivered to.
//!
//! Delivery never blocks: every connection has a bounded outbox and events
//! are pushed with `try_send`. A full or closed outbox skips that recipient
//! only. A connection leaves the registry solely through
//! [`RoomRegistry::disconnect`], never because a send to it failed.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{RoomId, ServerMessage};

/// Error text sent to a client whose `create` collides with a live room.
pub const ROOM_EXISTS_MESSAGE: &str = "Room already exists";

// ── Connections ─────────────────────────────────────────────────────

/// Stable identity of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build an identifier from a fixed value. Handy for deterministic tests.
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Non-owning handle to a live connection: its identity plus the sending half
/// of its outbox. The session task that owns the transport drains the outbox.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbox: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh identifier.
    pub fn new(outbox: mpsc::Sender<ServerMessage>) -> Self {
        Self::with_id(ConnectionId::new(), outbox)
    }

    /// Create a handle with an explicit identifier.
    pub fn with_id(id: ConnectionId, outbox: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, outbox }
    }

    /// Identity of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Push an event to this connection without waiting. If the outbox is
    /// full or closed the event is dropped and logged.
    fn deliver(&self, message: ServerMessage) {
        match self.outbox.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    connection = %self.id,
                    kind = dropped.kind(),
                    "outbox full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                debug!(
                    connection = %self.id,
                    kind = dropped.kind(),
                    "outbox closed, dropping event"
                );
            }
        }
    }
}

// ── Registry state ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Room {
    members: HashMap<ConnectionId, ConnectionHandle>,
}

impl Room {
    fn broadcast(&self, message: &ServerMessage, except: Option<ConnectionId>) {
        for (id, member) in &self.members {
            if Some(*id) == except {
                continue;
            }
            member.deliver(message.clone());
        }
    }

    fn broadcast_count(&self) {
        self.broadcast(
            &ServerMessage::Count {
                count: self.members.len(),
            },
            None,
        );
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    rooms: HashMap<RoomId, Room>,
    memberships: HashMap<ConnectionId, RoomId>,
}

impl RegistryState {
    /// Remove `id` from its current room. Deletes the room if that leaves it
    /// empty, otherwise tells the remaining members the new count.
    fn detach(&mut self, id: ConnectionId) {
        let Some(room_id) = self.memberships.remove(&id) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        room.members.remove(&id);

        if room.members.is_empty() {
            self.rooms.remove(&room_id);
            info!(room = %room_id, "room closed");
        } else {
            debug!(room = %room_id, members = room.members.len(), "member left room");
            room.broadcast_count();
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Process-wide registry of live rooms and their members.
///
/// Share it between sessions with an [`Arc`](std::sync::Arc).
#[derive(Debug, Default)]
pub struct RoomRegistry {
    state: Mutex<RegistryState>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty room named `room_id`.
    ///
    /// Replies with an `error` event if the name is taken by a live room. The
    /// requesting connection is not added to the room.
    ///
    /// A created room stays live with zero members until someone joins it and
    /// the last member leaves. Rooms nobody ever joins are never reclaimed, so
    /// a client issuing many `create`s grows the registry without bound; cap
    /// or expire them upstream if clients are untrusted.
    pub async fn create(&self, connection: &ConnectionHandle, room_id: RoomId) {
        let mut state = self.state.lock().await;
        if state.rooms.contains_key(&room_id) {
            debug!(connection = %connection.id, room = %room_id, "create rejected, room exists");
            connection.deliver(ServerMessage::Error {
                message: ROOM_EXISTS_MESSAGE.to_string(),
            });
            return;
        }
        info!(connection = %connection.id, room = %room_id, "room created");
        state.rooms.insert(room_id, Room::default());
    }

    /// Move `connection` into `room_id`, creating the room if it is not live.
    ///
    /// The connection first leaves whatever room it was in. Every member of
    /// the joined room, the joiner included, then receives the new count.
    pub async fn join(&self, connection: &ConnectionHandle, room_id: RoomId) {
        let mut state = self.state.lock().await;

        if state.memberships.get(&connection.id) != Some(&room_id) {
            state.detach(connection.id);
        }

        state.memberships.insert(connection.id, room_id.clone());
        let room = state.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!(room = %room_id, "room created by join");
            Room::default()
        });
        room.members.insert(connection.id, connection.clone());
        debug!(
            connection = %connection.id,
            room = %room_id,
            members = room.members.len(),
            "joined room"
        );
        room.broadcast_count();
    }

    /// Relay `text` from `connection` to every other member of `room_id`.
    ///
    /// Silently dropped if the room is not live or the sender is not one of
    /// its members.
    pub async fn message(
        &self,
        connection: &ConnectionHandle,
        room_id: &str,
        text: String,
        display_name: String,
    ) {
        let state = self.state.lock().await;
        let Some(room) = state.rooms.get(room_id) else {
            debug!(
                connection = %connection.id,
                room = %room_id,
                "message for unknown room dropped"
            );
            return;
        };
        if !room.members.contains_key(&connection.id) {
            debug!(connection = %connection.id, room = %room_id, "message from non-member dropped");
            return;
        }
        room.broadcast(
            &ServerMessage::Message {
                message: text,
                name: display_name,
            },
            Some(connection.id),
        );
    }

    /// Remove a terminated connection from its room.
    ///
    /// Deletes the room if it is now empty, otherwise sends the remaining
    /// members the updated count. A connection that never joined is a no-op.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;
        state.detach(id);
        debug!(connection = %id, "connection removed from registry");
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    /// Returns `true` if `room_id` is a live room.
    pub async fn contains_room(&self, room_id: &str) -> bool {
        self.state.lock().await.rooms.contains_key(room_id)
    }

    /// Member count of `room_id`, or `None` if the room is not live.
    pub async fn member_count(&self, room_id: &str) -> Option<usize> {
        self.state
            .lock()
            .await
            .rooms
            .get(room_id)
            .map(|room| room.members.len())
    }

    /// The room `id` currently belongs to, if any.
    pub async fn room_of(&self, id: ConnectionId) -> Option<RoomId> {
        self.state.lock().await.memberships.get(&id).cloned()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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

    fn connection(n: u128) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (ConnectionHandle::with_id(ConnectionId::from_u128(n), tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn count(n: usize) -> ServerMessage {
        ServerMessage::Count { count: n }
    }

    #[tokio::test]
    async fn create_inserts_empty_room_without_joining() {
        let registry = RoomRegistry::new();
        let (a, mut a_rx) = connection(1);

        registry.create(&a, "abc".into()).await;

        assert!(registry.contains_room("abc").await);
        assert_eq!(registry.member_count("abc").await, Some(0));
        assert_eq!(registry.room_of(a.id()).await, None);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn create_collision_replies_error_to_requester_only() {
        let registry = RoomRegistry::new();
        let (a, mut a_rx) = connection(1);
        let (b, mut b_rx) = connection(2);

        registry.join(&a, "abc".into()).await;
        drain(&mut a_rx);
        registry.create(&b, "abc".into()).await;

        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::Error {
                message: ROOM_EXISTS_MESSAGE.into()
            }]
        );
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(registry.member_count("abc").await, Some(1));
    }

    #[tokio::test]
    async fn join_same_room_twice_keeps_single_membership() {
        let registry = RoomRegistry::new();
        let (a, mut a_rx) = connection(1);
        let (b, mut b_rx) = connection(2);

        registry.join(&a, "abc".into()).await;
        registry.join(&b, "abc".into()).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        registry.join(&a, "abc".into()).await;

        assert_eq!(registry.member_count("abc").await, Some(2));
        assert_eq!(drain(&mut a_rx), vec![count(2)]);
        assert_eq!(drain(&mut b_rx), vec![count(2)]);
    }

    #[tokio::test]
    async fn join_elsewhere_updates_count_of_room_left_behind() {
        let registry = RoomRegistry::new();
        let (a, mut a_rx) = connection(1);
        let (b, mut b_rx) = connection(2);

        registry.join(&a, "one".into()).await;
        registry.join(&b, "one".into()).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        registry.join(&a, "two".into()).await;

        assert_eq!(drain(&mut b_rx), vec![count(1)]);
        assert_eq!(drain(&mut a_rx), vec![count(1)]);
        assert_eq!(registry.room_of(a.id()).await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn message_from_non_member_is_dropped() {
        let registry = RoomRegistry::new();
        let (a, mut a_rx) = connection(1);
        let (b, mut b_rx) = connection(2);

        registry.join(&a, "abc".into()).await;
        drain(&mut a_rx);

        registry
            .message(&b, "abc", "hello".into(), "Bob".into())
            .await;

        assert!(drain(&mut a_rx).is_empty());
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn disconnect_unknown_connection_is_noop() {
        let registry = RoomRegistry::new();
        registry.create(&connection(9).0, "keep".into()).await;

        registry.disconnect(ConnectionId::from_u128(42)).await;

        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn full_outbox_does_not_stop_broadcast() {
        let registry = RoomRegistry::new();
        let (tx, mut slow_rx) = mpsc::channel(1);
        let slow = ConnectionHandle::with_id(ConnectionId::from_u128(1), tx);
        let (b, mut b_rx) = connection(2);
        let (c, mut c_rx) = connection(3);

        registry.join(&slow, "abc".into()).await;
        registry.join(&b, "abc".into()).await;
        registry.join(&c, "abc".into()).await;
        drain(&mut b_rx);
        drain(&mut c_rx);

        registry.message(&b, "abc", "hi".into(), "Bob".into()).await;

        // The slow outbox still holds its first count event.
        assert_eq!(drain(&mut slow_rx), vec![count(1)]);
        assert_eq!(
            drain(&mut c_rx),
            vec![ServerMessage::Message {
                message: "hi".into(),
                name: "Bob".into()
            }]
        );
        assert_eq!(registry.member_count("abc").await, Some(3));
    }

    #[tokio::test]
    async fn closed_outbox_is_skipped_and_kept_until_disconnect() {
        let registry = RoomRegistry::new();
        let (a, a_rx) = connection(1);
        let (b, mut b_rx) = connection(2);

        registry.join(&a, "abc".into()).await;
        registry.join(&b, "abc".into()).await;
        drop(a_rx);
        drain(&mut b_rx);

        registry
            .message(&b, "abc", "anyone?".into(), "Bob".into())
            .await;
        assert_eq!(registry.member_count("abc").await, Some(2));

        registry.disconnect(a.id()).await;
        assert_eq!(drain(&mut b_rx), vec![count(1)]);
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
        assert_eq!(ConnectionId::from_u128(7), ConnectionId::from_u128(7));
    }
}
