#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Room lifecycle and broadcast properties of [`RoomRegistry`].
//!
//! Drives the registry directly through connection handles and inspects what
//! lands in each connection's outbox.

mod common;

use std::sync::Arc;

use room_relay::protocol::ServerMessage;
use room_relay::registry::ROOM_EXISTS_MESSAGE;
use room_relay::RoomRegistry;

use common::{count, drain, handle, relayed};

fn room_exists() -> ServerMessage {
    ServerMessage::Error {
        message: ROOM_EXISTS_MESSAGE.into(),
    }
}

// ════════════════════════════════════════════════════════════════════
// End-to-end scenario
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_join_message_disconnect_scenario() {
    let registry = RoomRegistry::new();
    let (a, mut a_rx) = handle(1);
    let (b, mut b_rx) = handle(2);

    registry.create(&a, "abc".into()).await;
    assert!(drain(&mut a_rx).is_empty());

    registry.create(&b, "abc".into()).await;
    assert_eq!(drain(&mut b_rx), vec![room_exists()]);

    registry.join(&b, "abc".into()).await;
    assert_eq!(drain(&mut b_rx), vec![count(1)]);

    registry.join(&a, "abc".into()).await;
    assert_eq!(drain(&mut a_rx), vec![count(2)]);
    assert_eq!(drain(&mut b_rx), vec![count(2)]);

    registry
        .message(&a, "abc", "hi".into(), "Alice".into())
        .await;
    assert_eq!(drain(&mut b_rx), vec![relayed("hi", "Alice")]);
    assert!(drain(&mut a_rx).is_empty());

    registry.disconnect(a.id()).await;
    assert_eq!(drain(&mut b_rx), vec![count(1)]);

    registry.disconnect(b.id()).await;
    assert!(!registry.contains_room("abc").await);
    assert_eq!(registry.room_count().await, 0);
    assert!(drain(&mut a_rx).is_empty());
    assert!(drain(&mut b_rx).is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Uniqueness
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_on_every_live_room_errors_without_mutation() {
    let registry = RoomRegistry::new();
    let (a, mut a_rx) = handle(1);
    let (b, mut b_rx) = handle(2);
    let (requester, mut requester_rx) = handle(99);

    registry.create(&a, "empty".into()).await;
    registry.join(&a, "one".into()).await;
    registry.join(&b, "two".into()).await;
    registry.join(&a, "two".into()).await;
    drain(&mut a_rx);
    drain(&mut b_rx);

    for room in ["empty", "two"] {
        let before = registry.member_count(room).await;
        registry.create(&requester, room.into()).await;
        assert_eq!(drain(&mut requester_rx), vec![room_exists()], "room {room}");
        assert_eq!(registry.member_count(room).await, before, "room {room}");
    }
    // "one" was emptied when `a` moved to "two".
    registry.create(&requester, "one".into()).await;
    assert!(drain(&mut requester_rx).is_empty());

    assert!(drain(&mut a_rx).is_empty());
    assert!(drain(&mut b_rx).is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Join-creates and single-room membership
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_missing_room_creates_it_with_joiner() {
    let registry = RoomRegistry::new();
    let (c, mut c_rx) = handle(1);

    registry.join(&c, "X".into()).await;

    assert_eq!(registry.member_count("X").await, Some(1));
    assert_eq!(registry.room_of(c.id()).await.as_deref(), Some("X"));
    assert_eq!(drain(&mut c_rx), vec![count(1)]);
}

#[tokio::test]
async fn connection_belongs_to_most_recent_join_only() {
    let registry = RoomRegistry::new();
    let (c, mut c_rx) = handle(1);
    let (d, mut d_rx) = handle(2);
    registry.join(&d, "b".into()).await;

    for room in ["a", "b", "c", "b", "a"] {
        registry.join(&c, room.into()).await;
        assert_eq!(registry.room_of(c.id()).await.as_deref(), Some(room));
    }

    assert_eq!(registry.member_count("a").await, Some(1));
    assert_eq!(registry.member_count("b").await, Some(1));
    assert!(!registry.contains_room("c").await);
    drain(&mut c_rx);
    drain(&mut d_rx);

    // Messages in the old room no longer reach `c`.
    registry
        .message(&d, "b", "still there?".into(), "Dee".into())
        .await;
    assert!(drain(&mut c_rx).is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Delivery
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn message_reaches_every_peer_but_not_sender() {
    let registry = RoomRegistry::new();
    let (c, mut c_rx) = handle(1);
    let (d, mut d_rx) = handle(2);
    let (e, mut e_rx) = handle(3);
    let (outsider, mut outsider_rx) = handle(4);

    for member in [&c, &d, &e] {
        registry.join(member, "room".into()).await;
    }
    registry.join(&outsider, "elsewhere".into()).await;
    for rx in [&mut c_rx, &mut d_rx, &mut e_rx, &mut outsider_rx] {
        drain(rx);
    }

    registry
        .message(&c, "room", "text".into(), "Cee".into())
        .await;

    assert!(drain(&mut c_rx).is_empty());
    assert_eq!(drain(&mut d_rx), vec![relayed("text", "Cee")]);
    assert_eq!(drain(&mut e_rx), vec![relayed("text", "Cee")]);
    assert!(drain(&mut outsider_rx).is_empty());
}

#[tokio::test]
async fn message_to_unknown_room_is_silent() {
    let registry = RoomRegistry::new();
    let (c, mut c_rx) = handle(1);
    registry.join(&c, "real".into()).await;
    drain(&mut c_rx);

    registry
        .message(&c, "ghost", "boo".into(), "Cee".into())
        .await;

    assert!(drain(&mut c_rx).is_empty());
    assert!(!registry.contains_room("ghost").await);
}

#[tokio::test]
async fn message_into_room_sender_never_joined_is_dropped() {
    let registry = RoomRegistry::new();
    let (member, mut member_rx) = handle(1);
    let (other, mut other_rx) = handle(2);
    registry.join(&member, "private".into()).await;
    registry.join(&other, "public".into()).await;
    drain(&mut member_rx);
    drain(&mut other_rx);

    registry
        .message(&other, "private", "let me in".into(), "Oz".into())
        .await;

    assert!(drain(&mut member_rx).is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Counts and teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn counts_track_live_membership() {
    let registry = RoomRegistry::new();
    let handles: Vec<_> = (1..=4).map(handle).collect();
    let (conns, mut rxs): (Vec<_>, Vec<_>) = handles.into_iter().unzip();

    for (i, conn) in conns.iter().enumerate() {
        registry.join(conn, "r".into()).await;
        for rx in rxs.iter_mut().take(i + 1) {
            assert_eq!(drain(rx), vec![count(i + 1)]);
        }
    }

    registry.disconnect(conns[0].id()).await;
    assert!(drain(&mut rxs[0]).is_empty());
    for rx in rxs.iter_mut().skip(1) {
        assert_eq!(drain(rx), vec![count(3)]);
    }

    registry.join(&conns[1], "other".into()).await;
    assert_eq!(drain(&mut rxs[1]), vec![count(1)]);
    for rx in rxs.iter_mut().skip(2) {
        assert_eq!(drain(rx), vec![count(2)]);
    }
}

#[tokio::test]
async fn emptied_room_is_immediately_reusable() {
    let registry = RoomRegistry::new();
    let (a, _a_rx) = handle(1);
    let (b, mut b_rx) = handle(2);

    registry.join(&a, "abc".into()).await;
    registry.disconnect(a.id()).await;
    assert!(!registry.contains_room("abc").await);

    registry.create(&b, "abc".into()).await;
    assert!(drain(&mut b_rx).is_empty());
    assert_eq!(registry.member_count("abc").await, Some(0));
}

#[tokio::test]
async fn rejoin_elsewhere_tears_down_sole_member_room() {
    let registry = RoomRegistry::new();
    let (a, mut a_rx) = handle(1);
    let (b, mut b_rx) = handle(2);

    registry.join(&a, "old".into()).await;
    registry.join(&a, "new".into()).await;
    assert_eq!(drain(&mut a_rx), vec![count(1), count(1)]);
    assert!(!registry.contains_room("old").await);

    registry.create(&b, "old".into()).await;
    assert!(drain(&mut b_rx).is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Concurrency
// ════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_and_disconnects_leave_consistent_state() {
    let registry = Arc::new(RoomRegistry::new());
    let mut tasks = Vec::new();

    for n in 0..64u128 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let (conn, _rx) = handle(n);
            let room = format!("room-{}", n % 4);
            registry.join(&conn, room.clone()).await;
            if n % 2 == 0 {
                registry.disconnect(conn.id()).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut total = 0;
    for r in 0..4 {
        let members = registry.member_count(&format!("room-{r}")).await;
        // Rooms with an even index only ever held even-numbered connections.
        if r % 2 == 0 {
            assert_eq!(members, None, "room-{r}");
        } else {
            assert_eq!(members, Some(16), "room-{r}");
            total += 16;
        }
    }
    assert_eq!(total, 32);
    assert_eq!(registry.room_count().await, 2);
}
