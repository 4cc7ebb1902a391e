//! The event loop: polls the multiplexer, looks up connections, and invokes
//! the handler matching each readiness kind.
//!
//! Strictly single-threaded and cooperative. The only suspension point in
//! the whole system is the multiplexer's `poll` call; accept, read, and
//! receive are all non-blocking and return with whatever is currently
//! available. The registry and every connection buffer are touched only by
//! the loop thread, so nothing here is locked. The one cross-thread surface
//! is [`ShutdownHandle`], which flips an atomic flag and wakes the poller.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mio::net::{TcpListener, TcpStream, UdpSocket};
use mio::{Interest, Token, Waker};

use crate::config::ServerConfig;
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::event::ReadyKind;
use crate::handler::{LogLevel, Logger, TransferSink};
use crate::poll::{Multiplexer, WAKER_TOKEN};
use crate::registry::{ConnState, Connection, ConnectionRegistry, Role, Socket};

/// Fixed acknowledgement written back once a stream peer half-closes.
pub const ACK_PAYLOAD: &[u8] = b"server: transfer received\n";

const EVENTS_CAPACITY: usize = 1024;

/// What a drain of one stream connection decided.
enum StreamOutcome {
    KeepOpen,
    Close,
}

/// Signals the dispatcher loop to stop and wakes its poll call. Cloneable
/// and callable from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        // a failed wake only delays shutdown until the next event
        let _ = self.waker.wake();
    }
}

pub struct Dispatcher<S: TransferSink> {
    config: ServerConfig,
    poll: Multiplexer,
    registry: ConnectionRegistry,
    sink: S,
    logger: Arc<dyn Logger>,
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
    listen_addr: SocketAddr,
    datagram_addr: SocketAddr,
    listener_token: Token,
    datagram_token: Token,
}

impl<S: TransferSink> Dispatcher<S> {
    /// Binds the TCP listener and the datagram socket and registers both for
    /// readiness. Fails fast with [`Error::Bind`] naming the address that
    /// could not be bound.
    pub fn bind(config: ServerConfig, sink: S) -> Result<Self> {
        let mut poll = Multiplexer::new(EVENTS_CAPACITY)?;
        let mut registry = ConnectionRegistry::new();

        let requested = SocketAddr::new(config.host, config.listen_port);
        let mut listener = TcpListener::bind(requested).map_err(|e| Error::Bind {
            addr: requested,
            source: e,
        })?;
        let listen_addr = listener.local_addr().map_err(Error::Io)?;
        let listener_token = registry.allocate_token();
        poll.register(&mut listener, listener_token, Interest::READABLE)?;
        registry.insert(Connection::listener(
            listener_token,
            listener,
            config.buffer_capacity,
        ));

        let requested = SocketAddr::new(config.host, config.datagram_port);
        let mut socket = UdpSocket::bind(requested).map_err(|e| Error::Bind {
            addr: requested,
            source: e,
        })?;
        let datagram_addr = socket.local_addr().map_err(Error::Io)?;
        let datagram_token = registry.allocate_token();
        poll.register(&mut socket, datagram_token, Interest::READABLE)?;
        registry.insert(Connection::datagram(
            datagram_token,
            socket,
            config.buffer_capacity,
        ));

        let waker = poll.waker();
        Ok(Self {
            logger: config.logger.clone(),
            config,
            poll,
            registry,
            sink,
            running: Arc::new(AtomicBool::new(true)),
            waker,
            listen_addr,
            datagram_addr,
            listener_token,
            datagram_token,
        })
    }

    /// The bound TCP address; resolves port 0 to the OS-assigned port.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// The bound UDP address.
    pub fn datagram_addr(&self) -> SocketAddr {
        self.datagram_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Runs the loop until [`ShutdownHandle::shutdown`] is called or the
    /// listener fails. Errors local to one stream connection tear that
    /// connection down without surfacing here.
    pub fn run(&mut self) -> Result<()> {
        self.logger.log(
            LogLevel::Info,
            &format!(
                "listening on {} (tcp) and {} (udp)",
                self.listen_addr, self.datagram_addr
            ),
        );

        while self.running.load(Ordering::SeqCst) {
            let events = self.poll.poll(None)?;

            for event in events {
                if event.token() == WAKER_TOKEN {
                    continue;
                }
                // the connection may have been torn down earlier in this
                // same ready set
                let Some((role, interest)) = self
                    .registry
                    .get(event.token())
                    .map(|conn| (conn.role(), conn.interest))
                else {
                    continue;
                };
                // dispatch only readiness the connection registered for
                let kind = match role {
                    Role::Listener if interest.is_readable() && event.is_readable() => {
                        ReadyKind::Acceptable
                    }
                    _ if interest.is_readable() && event.is_readable() => ReadyKind::Readable,
                    _ if interest.is_writable() && event.is_writable() => ReadyKind::Writable,
                    _ => continue,
                };
                match (kind, role) {
                    (ReadyKind::Acceptable, Role::Listener) => self.handle_acceptable()?,
                    (ReadyKind::Readable, Role::Stream) => {
                        self.handle_stream_readable(event.token())?
                    }
                    (ReadyKind::Readable, Role::Datagram) => self.handle_datagram_readable()?,
                    // nothing is ever queued behind write readiness
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Drains pending connections off the listener. Readiness with nothing
    /// actually pending is a no-op, not an error. Listener failure aborts
    /// the loop.
    fn handle_acceptable(&mut self) -> Result<()> {
        let mut accepted = Vec::new();
        {
            let Some(conn) = self.registry.get(self.listener_token) else {
                return Ok(());
            };
            let Socket::Listener(listener) = &conn.socket else {
                return Ok(());
            };
            loop {
                match listener.accept() {
                    Ok((stream, peer)) => accepted.push((stream, peer)),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(Error::Listener(e)),
                }
            }
        }

        for (mut stream, peer) in accepted {
            let token = self.registry.allocate_token();
            // a failed registration loses this connection only
            if let Err(e) = self.poll.register(&mut stream, token, Interest::READABLE) {
                self.logger.log(
                    LogLevel::Error,
                    &format!("failed to register connection from {}: {}", peer, e),
                );
                continue;
            }
            self.registry.insert(Connection::stream(
                token,
                stream,
                peer,
                self.config.buffer_capacity,
            ));
            if let Err(e) = self.sink.on_connect(token, peer) {
                self.logger
                    .log(LogLevel::Error, &format!("sink on_connect error: {}", e));
            }
            self.logger.log(
                LogLevel::Info,
                &format!("new connection: {} ({:?})", peer, token),
            );
        }
        Ok(())
    }

    /// Drains available bytes from one stream connection. A zero read is the
    /// peer's half-close: acknowledge and tear down. Any other I/O error is
    /// treated the same as the half-close, minus the acknowledgement.
    fn handle_stream_readable(&mut self, token: Token) -> Result<()> {
        let outcome = {
            let Some(conn) = self.registry.get_mut(token) else {
                return Ok(());
            };
            let Socket::Stream(stream) = &mut conn.socket else {
                return Ok(());
            };

            loop {
                match stream.read(conn.buffer.unfilled_mut()) {
                    Ok(0) => {
                        conn.peer_closed_input = true;
                        conn.state = ConnState::Closing;
                        conn.buffer.flip_to_drain();
                        write_ack(stream, self.logger.as_ref());
                        break StreamOutcome::Close;
                    }
                    Ok(n) => {
                        conn.buffer.advance(n)?;
                        conn.buffer.flip_to_drain();
                        let staged = conn.buffer.remaining();
                        let delivered = self.sink.on_data(token, conn.buffer.read_bytes(staged));
                        conn.buffer.flip_to_fill();
                        if let Err(e) = delivered {
                            self.logger.log(
                                LogLevel::Error,
                                &format!("sink rejected data on {:?}: {}", token, e),
                            );
                            break StreamOutcome::Close;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        break StreamOutcome::KeepOpen;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        conn.state = ConnState::Closing;
                        self.sink.on_error(token, &e);
                        break StreamOutcome::Close;
                    }
                }
            }
        };

        if let StreamOutcome::Close = outcome {
            self.teardown(token);
        }
        Ok(())
    }

    /// Receives pending packets one at a time, attributing each to its
    /// sender. A failed receive is logged and skipped; the endpoint stays
    /// registered and never closes except on explicit shutdown.
    fn handle_datagram_readable(&mut self) -> Result<()> {
        let Some(conn) = self.registry.get_mut(self.datagram_token) else {
            return Ok(());
        };
        let Socket::Datagram(socket) = &conn.socket else {
            return Ok(());
        };

        loop {
            match socket.recv_from(conn.buffer.unfilled_mut()) {
                Ok((n, peer)) => {
                    conn.buffer.advance(n)?;
                    conn.buffer.flip_to_drain();
                    let staged = conn.buffer.remaining();
                    if let Err(e) = self.sink.on_datagram(peer, conn.buffer.read_bytes(staged)) {
                        self.logger.log(
                            LogLevel::Error,
                            &format!("sink rejected datagram from {}: {}", peer, e),
                        );
                    }
                    conn.buffer.flip_to_fill();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.logger
                        .log(LogLevel::Warn, &format!("datagram receive failed: {}", e));
                    break;
                }
            }
        }
        Ok(())
    }

    /// Deregisters, notifies the sink, and closes the descriptor, in that
    /// order. Dropping the removed connection closes the socket.
    fn teardown(&mut self, token: Token) {
        if let Some(mut conn) = self.registry.remove(token) {
            conn.state = ConnState::Closed;
            if let Err(e) = self.poll.deregister(&mut conn.socket, token) {
                self.logger.log(
                    LogLevel::Warn,
                    &format!("deregister failed for {:?}: {}", token, e),
                );
            }
            if let Err(e) = self.sink.on_disconnect(token) {
                self.logger
                    .log(LogLevel::Error, &format!("sink on_disconnect error: {}", e));
            }
            self.logger
                .log(LogLevel::Info, &format!("connection {:?} closed", token));
        }
    }
}

/// Stages the acknowledgement through a drain-mode cursor and writes it in
/// one attempt. A peer that tore down first just misses the ack; there is no
/// retry.
fn write_ack(stream: &mut TcpStream, logger: &dyn Logger) {
    let mut ack = ByteCursor::with_capacity(ACK_PAYLOAD.len());
    ack.write_bytes(ACK_PAYLOAD);
    ack.flip_to_drain();
    let staged = ack.remaining();
    if let Err(e) = stream.write_all(ack.read_bytes(staged)) {
        logger.log(
            LogLevel::Debug,
            &format!("ack write failed, peer already gone: {}", e),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Shutdown;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct CaptureSink {
        streams: Arc<Mutex<HashMap<usize, Vec<u8>>>>,
        datagrams: Arc<Mutex<Vec<(SocketAddr, Vec<u8>)>>>,
        disconnects: Arc<Mutex<Vec<usize>>>,
        errors: Arc<Mutex<Vec<usize>>>,
    }

    impl TransferSink for CaptureSink {
        fn on_data(&self, token: Token, payload: &[u8]) -> Result<()> {
            self.streams
                .lock()
                .unwrap()
                .entry(token.0)
                .or_default()
                .extend_from_slice(payload);
            Ok(())
        }

        fn on_datagram(&self, peer: SocketAddr, payload: &[u8]) -> Result<()> {
            self.datagrams.lock().unwrap().push((peer, payload.to_vec()));
            Ok(())
        }

        fn on_disconnect(&self, token: Token) -> Result<()> {
            self.disconnects.lock().unwrap().push(token.0);
            Ok(())
        }

        fn on_error(&self, token: Token, _error: &io::Error) {
            self.errors.lock().unwrap().push(token.0);
        }
    }

    /// Makes dropping the stream an abortive close: the kernel sends RST
    /// instead of FIN, so the server's next read fails.
    #[cfg(unix)]
    fn abort_on_drop(stream: &std::net::TcpStream) {
        use std::os::fd::AsRawFd;

        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };
        let rc = unsafe {
            libc::setsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                &linger as *const libc::linger as *const libc::c_void,
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, 0, "setsockopt(SO_LINGER) failed");
    }

    fn start_server(
        sink: CaptureSink,
    ) -> (
        SocketAddr,
        SocketAddr,
        ShutdownHandle,
        thread::JoinHandle<Result<()>>,
    ) {
        let config = ServerConfig::builder()
            .listen_port(0)
            .datagram_port(0)
            .build();
        let mut dispatcher = Dispatcher::bind(config, sink).unwrap();
        let tcp = dispatcher.listen_addr();
        let udp = dispatcher.datagram_addr();
        let handle = dispatcher.shutdown_handle();
        let join = thread::spawn(move || dispatcher.run());
        (tcp, udp, handle, join)
    }

    fn stop_server(handle: ShutdownHandle, join: thread::JoinHandle<Result<()>>) {
        handle.shutdown();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_roundtrip_bytes_then_ack() {
        let sink = CaptureSink::default();
        let (tcp, _udp, handle, join) = start_server(sink.clone());

        // larger than the 1024-byte cursor to force several fill/drain cycles
        let payload: Vec<u8> = (0u32..4096).map(|i| (i % 251) as u8).collect();

        let mut stream = std::net::TcpStream::connect(tcp).unwrap();
        stream.write_all(&payload).unwrap();
        stream.shutdown(Shutdown::Write).unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        assert_eq!(response, ACK_PAYLOAD);

        {
            let streams = sink.streams.lock().unwrap();
            assert_eq!(streams.len(), 1);
            assert_eq!(streams.values().next().unwrap(), &payload);
        }
        assert_eq!(sink.disconnects.lock().unwrap().len(), 1);

        stop_server(handle, join);
    }

    #[test]
    fn test_zero_byte_half_close_still_gets_ack() {
        let sink = CaptureSink::default();
        let (tcp, _udp, handle, join) = start_server(sink.clone());

        let mut stream = std::net::TcpStream::connect(tcp).unwrap();
        stream.shutdown(Shutdown::Write).unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        assert_eq!(response, ACK_PAYLOAD);
        assert!(sink.streams.lock().unwrap().is_empty());

        stop_server(handle, join);
    }

    #[test]
    fn test_five_concurrent_clients_no_cross_talk() {
        let sink = CaptureSink::default();
        let (tcp, _udp, handle, join) = start_server(sink.clone());

        let clients: Vec<_> = (0..5u8)
            .map(|i| {
                thread::spawn(move || {
                    let payload = vec![i; 512 + i as usize * 100];
                    let mut stream = std::net::TcpStream::connect(tcp).unwrap();
                    stream.write_all(&payload).unwrap();
                    stream.shutdown(Shutdown::Write).unwrap();
                    let mut response = Vec::new();
                    stream.read_to_end(&mut response).unwrap();
                    assert_eq!(response, ACK_PAYLOAD);
                    payload
                })
            })
            .collect();

        let mut expected: Vec<Vec<u8>> = clients.into_iter().map(|c| c.join().unwrap()).collect();
        expected.sort();

        let mut received: Vec<Vec<u8>> = sink.streams.lock().unwrap().values().cloned().collect();
        received.sort();
        assert_eq!(received, expected);

        stop_server(handle, join);
    }

    #[test]
    fn test_datagram_payload_delivered_unchanged() {
        let sink = CaptureSink::default();
        let (_tcp, udp, handle, join) = start_server(sink.clone());

        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let payload = b"single datagram payload";
        socket.send_to(payload, udp).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            {
                let datagrams = sink.datagrams.lock().unwrap();
                if !datagrams.is_empty() {
                    assert_eq!(datagrams.len(), 1);
                    assert_eq!(datagrams[0].1, payload);
                    assert_eq!(datagrams[0].0, socket.local_addr().unwrap());
                    break;
                }
            }
            assert!(Instant::now() < deadline, "datagram never delivered");
            thread::sleep(Duration::from_millis(10));
        }

        stop_server(handle, join);
    }

    #[test]
    fn test_datagram_endpoint_survives_many_packets() {
        let sink = CaptureSink::default();
        let (_tcp, udp, handle, join) = start_server(sink.clone());

        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        for i in 0..10u8 {
            socket.send_to(&[i; 32], udp).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.datagrams.lock().unwrap().len() < 10 {
            assert!(Instant::now() < deadline, "datagrams never delivered");
            thread::sleep(Duration::from_millis(10));
        }

        let datagrams = sink.datagrams.lock().unwrap();
        for (_, payload) in datagrams.iter() {
            assert_eq!(payload.len(), 32);
        }
        drop(datagrams);

        stop_server(handle, join);
    }

    #[test]
    fn test_accept_with_nothing_pending_is_a_no_op() {
        // readiness reported but no connection pending (spurious wakeup):
        // treated as AcceptUnavailable, not assumed impossible
        let config = ServerConfig::builder()
            .listen_port(0)
            .datagram_port(0)
            .build();
        let mut dispatcher = Dispatcher::bind(config, CaptureSink::default()).unwrap();
        let before = dispatcher.registry.len();

        dispatcher.handle_acceptable().unwrap();

        assert_eq!(dispatcher.registry.len(), before);
    }

    #[test]
    fn test_bind_failure_is_reported_at_startup() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let config = ServerConfig::builder()
            .listen_port(port)
            .datagram_port(0)
            .build();
        let Err(err) = Dispatcher::bind(config, CaptureSink::default()) else {
            panic!("bind unexpectedly succeeded on an occupied port");
        };
        assert!(matches!(err, Error::Bind { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[test]
    #[cfg(unix)]
    fn test_stream_reset_tears_down_only_that_connection() {
        let sink = CaptureSink::default();
        let (tcp, _udp, handle, join) = start_server(sink.clone());

        // connect, write, then abort: the server's read on this connection
        // fails with a reset instead of reaching end-of-stream
        let mut doomed = std::net::TcpStream::connect(tcp).unwrap();
        doomed.write_all(b"never acknowledged").unwrap();
        abort_on_drop(&doomed);
        drop(doomed);

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.errors.lock().unwrap().is_empty() {
            assert!(Instant::now() < deadline, "read failure never surfaced");
            thread::sleep(Duration::from_millis(10));
        }

        // no ack was attempted for the torn-down peer, and the loop is
        // still serving: a healthy client round-trips as usual
        let payload = vec![7u8; 256];
        let mut stream = std::net::TcpStream::connect(tcp).unwrap();
        stream.write_all(&payload).unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        assert_eq!(response, ACK_PAYLOAD);

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.disconnects.lock().unwrap().len() < 2 {
            assert!(Instant::now() < deadline, "teardown never completed");
            thread::sleep(Duration::from_millis(10));
        }

        stop_server(handle, join);
    }

    #[test]
    fn test_shutdown_stops_a_blocked_loop_promptly() {
        let sink = CaptureSink::default();
        let (_tcp, _udp, handle, join) = start_server(sink);

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        handle.shutdown();
        join.join().unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sequential_clients_reuse_the_loop() {
        let sink = CaptureSink::default();
        let (tcp, _udp, handle, join) = start_server(sink.clone());

        for round in 0..3u8 {
            let payload = vec![round; 64];
            let mut stream = std::net::TcpStream::connect(tcp).unwrap();
            stream.write_all(&payload).unwrap();
            stream.shutdown(Shutdown::Write).unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).unwrap();
            assert_eq!(response, ACK_PAYLOAD);
        }

        assert_eq!(sink.streams.lock().unwrap().len(), 3);
        assert_eq!(sink.disconnects.lock().unwrap().len(), 3);

        stop_server(handle, join);
    }
}
