//! Blocking transfer client.
//!
//! The counterpart of the server loop: streams a byte source to the server
//! through a fixed-capacity cursor, half-closes its output, and collects the
//! acknowledgement. Ordinary blocking sockets on purpose; the non-blocking
//! machinery lives entirely on the server side.

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::net::{
    IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket,
};
use std::path::Path;

use crate::config::DEFAULT_BUFFER_CAPACITY;
use crate::cursor::ByteCursor;
use crate::error::Result;

pub struct Client {
    stream: TcpStream,
    cursor: ByteCursor,
}

impl Client {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Self::connect_with_capacity(addr, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn connect_with_capacity<A: ToSocketAddrs>(addr: A, capacity: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self {
            stream,
            cursor: ByteCursor::with_capacity(capacity),
        })
    }

    /// Streams the reader to the server one cursor-full at a time:
    /// fill, flip, write, clear, until the source is exhausted.
    /// Returns the number of bytes sent.
    pub fn send_reader<R: Read>(&mut self, reader: &mut R) -> Result<u64> {
        let mut total = 0u64;
        loop {
            self.cursor.flip_to_fill();
            let n = reader.read(self.cursor.unfilled_mut())?;
            if n == 0 {
                break;
            }
            self.cursor.advance(n)?;
            self.cursor.flip_to_drain();
            let staged = self.cursor.remaining();
            self.stream.write_all(self.cursor.read_bytes(staged))?;
            total += staged as u64;
        }
        Ok(total)
    }

    pub fn send_bytes(&mut self, mut bytes: &[u8]) -> Result<u64> {
        self.send_reader(&mut bytes)
    }

    pub fn send_file<P: AsRef<Path>>(&mut self, path: P) -> Result<u64> {
        let mut file = File::open(path)?;
        self.send_reader(&mut file)
    }

    /// Half-closes output to signal end of transfer, then reads the server's
    /// acknowledgement until it closes the connection.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.stream.shutdown(Shutdown::Write)?;
        let mut ack = Vec::new();
        self.stream.read_to_end(&mut ack)?;
        Ok(ack)
    }
}

/// Sends one datagram staged through a default-capacity cursor. Fails with
/// [`Error::CapacityExceeded`](crate::Error::CapacityExceeded) when the
/// payload does not fit; no response is expected.
pub fn send_datagram(to: SocketAddr, payload: &[u8]) -> Result<usize> {
    let mut cursor = ByteCursor::with_capacity(DEFAULT_BUFFER_CAPACITY);
    cursor.write_all_bytes(payload)?;
    cursor.flip_to_drain();

    let local = match to {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(local)?;
    let staged = cursor.remaining();
    let sent = socket.send_to(cursor.read_bytes(staged), to)?;
    Ok(sent)
}
