//! Exclusive-ownership table mapping descriptors to their connections.
//!
//! The registry is touched by exactly one thread, the dispatcher loop, which
//! is both the only mutator and the only reader; no synchronization is
//! needed. Every registered token has exactly one [`Connection`] entry, and
//! deregistration always precedes descriptor close.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use mio::event::Source;
use mio::net::{TcpListener, TcpStream, UdpSocket};
use mio::{Interest, Registry, Token};

use crate::cursor::ByteCursor;

/// What a descriptor is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Listener,
    Stream,
    Datagram,
}

/// Lifecycle of a connection. Streams move `Open -> Closing -> Closed`;
/// the listener stays `Listening` and the datagram endpoint stays `Open`
/// until explicit shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Listening,
    Open,
    Closing,
    Closed,
}

/// Owned socket handle. Exactly one connection owns each descriptor; it is
/// never duplicated.
pub enum Socket {
    Listener(TcpListener),
    Stream(TcpStream),
    Datagram(UdpSocket),
}

impl Socket {
    pub fn role(&self) -> Role {
        match self {
            Socket::Listener(_) => Role::Listener,
            Socket::Stream(_) => Role::Stream,
            Socket::Datagram(_) => Role::Datagram,
        }
    }
}

impl Source for Socket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Socket::Listener(l) => l.register(registry, token, interests),
            Socket::Stream(s) => s.register(registry, token, interests),
            Socket::Datagram(d) => d.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            Socket::Listener(l) => l.reregister(registry, token, interests),
            Socket::Stream(s) => s.reregister(registry, token, interests),
            Socket::Datagram(d) => d.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Socket::Listener(l) => l.deregister(registry),
            Socket::Stream(s) => s.deregister(registry),
            Socket::Datagram(d) => d.deregister(registry),
        }
    }
}

/// One registered descriptor: its socket, role, state, registered interest,
/// staging cursor, and the half-close flag.
pub struct Connection {
    token: Token,
    pub socket: Socket,
    pub state: ConnState,
    pub interest: Interest,
    pub buffer: ByteCursor,
    pub peer_closed_input: bool,
    peer_addr: Option<SocketAddr>,
}

impl Connection {
    pub fn listener(token: Token, listener: TcpListener, buffer_capacity: usize) -> Self {
        Self {
            token,
            socket: Socket::Listener(listener),
            state: ConnState::Listening,
            interest: Interest::READABLE,
            buffer: ByteCursor::with_capacity(buffer_capacity),
            peer_closed_input: false,
            peer_addr: None,
        }
    }

    pub fn stream(
        token: Token,
        stream: TcpStream,
        peer_addr: SocketAddr,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            token,
            socket: Socket::Stream(stream),
            state: ConnState::Open,
            interest: Interest::READABLE,
            buffer: ByteCursor::with_capacity(buffer_capacity),
            peer_closed_input: false,
            peer_addr: Some(peer_addr),
        }
    }

    pub fn datagram(token: Token, socket: UdpSocket, buffer_capacity: usize) -> Self {
        Self {
            token,
            socket: Socket::Datagram(socket),
            state: ConnState::Open,
            interest: Interest::READABLE,
            buffer: ByteCursor::with_capacity(buffer_capacity),
            peer_closed_input: false,
            peer_addr: None,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn role(&self) -> Role {
        self.socket.role()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

pub struct ConnectionRegistry {
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            // Token(0) is reserved for the waker
            next_token: 1,
        }
    }

    /// Hands out the next unused token. Tokens are never reused.
    pub fn allocate_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.token(), connection);
    }

    pub fn get(&self, token: Token) -> Option<&Connection> {
        self.connections.get(&token)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection> {
        self.connections.get_mut(&token)
    }

    pub fn remove(&mut self, token: Token) -> Option<Connection> {
        self.connections.remove(&token)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
