//! Transfer client demo.
//!
//! ```sh
//! cargo run --example client [addr] [file]
//! ```
//!
//! Streams the file (or stdin when no file is given) to the server,
//! half-closes, and prints the acknowledgement.

use sluice_io::Client;
use std::io;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9898".to_string());

    let mut client = Client::connect(&addr)?;
    let sent = match std::env::args().nth(2) {
        Some(path) => client.send_file(path)?,
        None => client.send_reader(&mut io::stdin().lock())?,
    };
    println!("sent {} bytes to {}", sent, addr);

    let ack = client.finish()?;
    println!("server replied: {}", String::from_utf8_lossy(&ack));
    Ok(())
}
