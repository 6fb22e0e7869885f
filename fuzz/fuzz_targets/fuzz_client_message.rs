#![no_main]

use libfuzzer_sys::fuzz_target;
use room_relay::protocol::ClientMessage;

fuzz_target!(|data: &[u8]| {
    // Inbound frames come straight off the socket; parsing must never panic.
    let _ = serde_json::from_slice::<ClientMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<ClientMessage>(s) {
            let _ = msg.kind();
        }
    }
});
