//! # Chat Client Demo
//!
//! A terminal client for the relay:
//!
//! 1. Connect to the relay over WebSocket
//! 2. Join a room (created on the fly if nobody is in it yet)
//! 3. Send every stdin line as a message, print what others say
//! 4. Exit on Ctrl+C, EOF, or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start the relay in one terminal:
//! cargo run
//!
//! # Then, in two more terminals:
//! cargo run --example chat_client -- abc Alice
//! cargo run --example chat_client -- abc Bob
//!
//! # Override the server URL:
//! RELAY_URL=ws://my-server:8080 cargo run --example chat_client -- abc Alice
//! ```

use futures_util::{SinkExt, StreamExt};
use room_relay::protocol::{ClientMessage, ServerMessage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;

/// Default server URL when `RELAY_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let room_id = args.next().unwrap_or_else(|| "lobby".to_string());
    let name = args.next().unwrap_or_else(|| "anonymous".to_string());
    let url = std::env::var("RELAY_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

    // ── Connect and join ────────────────────────────────────────────
    let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    tracing::info!("connected to {url}");

    let join = ClientMessage::Join {
        room_id: room_id.clone(),
    };
    ws.send(Message::Text(serde_json::to_string(&join)?.into()))
        .await?;
    println!("joined room {room_id} as {name}; type to chat");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            frame = ws.next() => {
                let Some(frame) = frame else {
                    println!("server closed the connection");
                    break;
                };
                let Message::Text(text) = frame? else { continue };
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::Message { message, name }) => println!("{name}: {message}"),
                    Ok(ServerMessage::Count { count }) => println!("-- {count} in room --"),
                    Ok(ServerMessage::Error { message }) => println!("!! {message}"),
                    Err(e) => tracing::warn!("unrecognized server frame: {e}"),
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let msg = ClientMessage::Message {
                    room_id: room_id.clone(),
                    message: line,
                    name: name.clone(),
                };
                ws.send(Message::Text(serde_json::to_string(&msg)?.into()))
                    .await?;
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    ws.close(None).await.ok();
    Ok(())
}
