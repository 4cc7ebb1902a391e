//! # Sluice-IO
//! A single-threaded, readiness-driven TCP/UDP transfer server built on
//! [`mio`], with no async runtime and no thread per connection.
//!
//! One thread runs the whole show: a [`Dispatcher`] polls a [`Multiplexer`]
//! for readiness, accepts stream connections, drains whatever bytes are
//! available into a fixed-capacity [`ByteCursor`], and hands them to your
//! [`TransferSink`]. When a peer half-closes its output the server replies
//! with a fixed acknowledgement ([`ACK_PAYLOAD`]) and closes. A datagram
//! endpoint on a second port delivers each received packet with its sender
//! address.
//!
//! ## Architecture Overview
//! ```text
//! ┌────────────┐    ┌──────────────┐    ┌────────────────────┐
//! │ Dispatcher │───▶│ Multiplexer  │───▶│ OS (epoll/kqueue)  │
//! └─────┬──────┘    └──────────────┘    └────────────────────┘
//!       │ ready events
//!       ▼
//! ┌────────────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ ConnectionRegistry │───▶│ ByteCursor   │───▶│ TransferSink │
//! └────────────────────┘    └──────────────┘    └──────────────┘
//! ```
//!
//! The poll call is the system's sole blocking point; accept, read, and
//! receive are non-blocking and drained to `WouldBlock`. The registry and
//! every buffer belong to the loop thread alone, so there is not a single
//! lock on the data path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sluice_io::{Dispatcher, Result, ServerConfig, Token, TransferSink};
//! use std::net::SocketAddr;
//!
//! struct PrintSink;
//!
//! impl TransferSink for PrintSink {
//!     fn on_data(&self, token: Token, payload: &[u8]) -> Result<()> {
//!         println!("{:?}: {} bytes", token, payload.len());
//!         Ok(())
//!     }
//!
//!     fn on_datagram(&self, peer: SocketAddr, payload: &[u8]) -> Result<()> {
//!         println!("{}: {} byte datagram", peer, payload.len());
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     // defaults: 127.0.0.1, tcp 9898, udp 9899, 1024-byte buffers
//!     let config = ServerConfig::default();
//!     let mut dispatcher = Dispatcher::bind(config, PrintSink)?;
//!     dispatcher.run() // blocks until a ShutdownHandle stops it
//! }
//! ```
//!
//! Stopping from another thread:
//!
//! ```rust,no_run
//! # use sluice_io::{Dispatcher, Result, ServerConfig, Token, TransferSink};
//! # use std::net::SocketAddr;
//! # struct PrintSink;
//! # impl TransferSink for PrintSink {
//! #     fn on_data(&self, _: Token, _: &[u8]) -> Result<()> { Ok(()) }
//! #     fn on_datagram(&self, _: SocketAddr, _: &[u8]) -> Result<()> { Ok(()) }
//! # }
//! let mut dispatcher = Dispatcher::bind(ServerConfig::default(), PrintSink)?;
//! let handle = dispatcher.shutdown_handle();
//! let join = std::thread::spawn(move || dispatcher.run());
//!
//! handle.shutdown();
//! join.join().unwrap()?;
//! # Ok::<(), sluice_io::Error>(())
//! ```
//!
//! - [`Dispatcher`]: the event loop; owns the sockets, registry, and poller
//! - [`Multiplexer`]: readiness polling over any mio `Source`
//! - [`ByteCursor`]: two-mode (fill/drain) fixed-capacity staging buffer
//! - [`TransferSink`]: where drained bytes and datagrams go
//! - [`Client`]: blocking counterpart that streams, half-closes, and reads
//!   the acknowledgement

pub mod client;
pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod poll;
pub mod registry;

pub use client::{Client, send_datagram};
pub use config::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_DATAGRAM_PORT, DEFAULT_LISTEN_PORT, ServerConfig,
    ServerConfigBuilder,
};
pub use cursor::ByteCursor;
pub use dispatcher::{ACK_PAYLOAD, Dispatcher, ShutdownHandle};
pub use error::{Error, Result};
pub use event::{IoEvent, ReadyKind};
pub use handler::{LogLevel, Logger, NoOpLogger, StderrLogger, TransferSink};
pub use mio::{Interest, Token};
pub use poll::{Multiplexer, WAKER_TOKEN};
pub use registry::{ConnState, Connection, ConnectionRegistry, Role, Socket};
