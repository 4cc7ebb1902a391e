//! Transfer server demo.
//!
//! ```sh
//! cargo run --example server [config.json]
//! ```
//!
//! Receives arbitrary byte streams on the TCP port and single datagrams on
//! the UDP port, printing what arrives. A client that half-closes gets the
//! fixed acknowledgement back.

use sluice_io::{
    Dispatcher, Result, ServerConfig, StderrLogger, Token, TransferSink,
};
use std::net::SocketAddr;
use std::sync::Arc;

struct PrintSink;

impl TransferSink for PrintSink {
    fn on_connect(&self, token: Token, peer: SocketAddr) -> Result<()> {
        println!("connected: {} ({:?})", peer, token);
        Ok(())
    }

    fn on_data(&self, token: Token, payload: &[u8]) -> Result<()> {
        println!(
            "{:?}: {} bytes: {}",
            token,
            payload.len(),
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }

    fn on_datagram(&self, peer: SocketAddr, payload: &[u8]) -> Result<()> {
        println!(
            "datagram from {}: {}",
            peer,
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }

    fn on_disconnect(&self, token: Token) -> Result<()> {
        println!("disconnected: {:?}", token);
        Ok(())
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut config: ServerConfig = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => ServerConfig::default(),
    };
    config.logger = Arc::new(StderrLogger);

    let mut dispatcher = Dispatcher::bind(config, PrintSink)?;
    println!(
        "listening on {} (tcp) and {} (udp)",
        dispatcher.listen_addr(),
        dispatcher.datagram_addr()
    );
    dispatcher.run()?;
    Ok(())
}
