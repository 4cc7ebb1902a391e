//! One-shot datagram sender demo.
//!
//! ```sh
//! cargo run --example datagram [addr] [message]
//! ```
//!
//! Sends a single datagram (the current unix time when no message is given)
//! and exits; the server never responds to datagrams.

use sluice_io::send_datagram;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9899".to_string())
        .parse()?;
    let message = std::env::args().nth(2).unwrap_or_else(|| {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        format!("unix time {}", now.as_secs())
    });

    let sent = send_datagram(addr, message.as_bytes())?;
    println!("sent {} bytes to {}", sent, addr);
    Ok(())
}
