use std::io;
use std::net::SocketAddr;

use mio::Token;

use crate::error::Result;

/// Downstream sink for bytes the dispatcher drains off the wire.
///
/// Only [`on_data`](TransferSink::on_data) and
/// [`on_datagram`](TransferSink::on_datagram) are mandatory; the lifecycle
/// callbacks default to doing nothing. Payload slices borrow the connection's
/// staging cursor and are only valid for the duration of the call: copy them
/// out if they must outlive it.
pub trait TransferSink: Send + Sync + 'static {
    /// Called when a stream connection is accepted.
    fn on_connect(&self, token: Token, peer: SocketAddr) -> Result<()> {
        let _ = (token, peer);
        Ok(())
    }

    /// Called with each chunk of bytes drained from a stream connection, in
    /// the order the peer sent them. Returning an error tears the connection
    /// down.
    fn on_data(&self, token: Token, payload: &[u8]) -> Result<()>;

    /// Called with each received datagram and its sender address. Datagrams
    /// are atomic: the payload is always one whole packet.
    fn on_datagram(&self, peer: SocketAddr, payload: &[u8]) -> Result<()>;

    /// Called after a stream connection is deregistered and closed.
    fn on_disconnect(&self, token: Token) -> Result<()> {
        let _ = token;
        Ok(())
    }

    /// Called on a stream I/O failure, just before teardown.
    fn on_error(&self, token: Token, error: &io::Error) {
        let _ = (token, error);
    }
}

/// Log levels for loop diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logging abstraction so the library never couples to a logging framework.
///
/// Implement this to route diagnostics wherever you prefer.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default logger that discards all messages.
#[derive(Default, Clone)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&self, _level: LogLevel, _message: &str) {
        // Do nothing
    }
}

/// Logger that writes every message to stderr, for demos and debugging.
#[derive(Default, Clone)]
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log(&self, level: LogLevel, message: &str) {
        eprintln!("[{:?}] {}", level, message);
    }
}
