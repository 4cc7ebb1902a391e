//! Readiness multiplexer over [`mio::Poll`].
//!
//! Owns the poller, the reusable event buffer, and a waker reserved at
//! [`WAKER_TOKEN`]. Registration tracks live tokens so that deregistering an
//! absent descriptor is an idempotent no-op rather than an error.
//!
//! mio delivers edge-style notifications, so callers must drain a ready
//! descriptor to `WouldBlock` before returning to `poll`; doing so preserves
//! the level-triggered liveness contract (every ready descriptor is
//! eventually and completely serviced).

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Interest, Poll, Token, Waker, event::Source};

use crate::error::{Error, Result};
use crate::event::IoEvent;

/// Token reserved for the waker; connection tokens start above it.
pub const WAKER_TOKEN: Token = Token(0);

pub struct Multiplexer {
    poller: Poll,
    events: Events,
    waker: Arc<Waker>,
    registered: HashSet<Token>,
}

impl Multiplexer {
    pub fn new(events_capacity: usize) -> Result<Self> {
        let poller = Poll::new().map_err(Error::Io)?;
        let waker = Waker::new(poller.registry(), WAKER_TOKEN).map_err(Error::Io)?;
        Ok(Self {
            poller,
            events: Events::with_capacity(events_capacity),
            waker: Arc::new(waker),
            registered: HashSet::new(),
        })
    }

    /// Adds or updates the descriptor's interest. Fails with
    /// [`Error::RegistrationFailed`] if the descriptor is closed or invalid;
    /// the failure is local to this registration attempt.
    pub fn register<S>(&mut self, source: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        if self.registered.contains(&token) {
            source
                .reregister(self.poller.registry(), token, interest)
                .map_err(Error::RegistrationFailed)?;
        } else {
            source
                .register(self.poller.registry(), token, interest)
                .map_err(Error::RegistrationFailed)?;
            self.registered.insert(token);
        }
        Ok(())
    }

    /// Removes the descriptor. Idempotent: an unknown token is a no-op, not
    /// an error.
    pub fn deregister<S>(&mut self, source: &mut S, token: Token) -> Result<()>
    where
        S: Source + ?Sized,
    {
        if !self.registered.remove(&token) {
            return Ok(());
        }
        source
            .deregister(self.poller.registry())
            .map_err(Error::Io)?;
        Ok(())
    }

    pub fn is_registered(&self, token: Token) -> bool {
        self.registered.contains(&token)
    }

    /// Blocks until at least one registered descriptor is ready or the
    /// timeout elapses; `None` blocks indefinitely. Returns a snapshot of the
    /// ready set. Iteration order of the snapshot is unspecified.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<IoEvent>> {
        loop {
            match self.poller.poll(&mut self.events, timeout) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.events.iter().map(IoEvent::from).collect())
    }

    /// Forces a blocked `poll` to return, delivering an event on
    /// [`WAKER_TOKEN`]. Callable from any thread via the cloned handle.
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    pub fn wake(&self) -> Result<()> {
        self.waker.wake().map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_poll_times_out_with_empty_ready_set() {
        let mut mux = Multiplexer::new(64).unwrap();
        let events = mux.poll(Some(Duration::from_millis(10))).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_register_then_deregister() {
        let mut mux = Multiplexer::new(64).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let token = Token(1);

        mux.register(&mut listener, token, Interest::READABLE)
            .unwrap();
        assert!(mux.is_registered(token));

        mux.deregister(&mut listener, token).unwrap();
        assert!(!mux.is_registered(token));
    }

    #[test]
    fn test_deregister_is_idempotent() {
        let mut mux = Multiplexer::new(64).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let token = Token(1);

        mux.register(&mut listener, token, Interest::READABLE)
            .unwrap();
        mux.deregister(&mut listener, token).unwrap();
        // second removal of the same token is a no-op
        mux.deregister(&mut listener, token).unwrap();
        // a token that was never registered is also a no-op
        mux.deregister(&mut listener, Token(42)).unwrap();
    }

    #[test]
    fn test_reregister_updates_interest() {
        let mut mux = Multiplexer::new(64).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let token = Token(1);

        mux.register(&mut listener, token, Interest::READABLE)
            .unwrap();
        mux.register(&mut listener, token, Interest::READABLE | Interest::WRITABLE)
            .unwrap();
        assert!(mux.is_registered(token));
    }

    #[test]
    fn test_wake_interrupts_infinite_poll() {
        let mut mux = Multiplexer::new(64).unwrap();
        let waker = mux.waker();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            waker.wake().unwrap();
        });

        let start = Instant::now();
        let events = mux.poll(None).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(events.iter().any(|e| e.token() == WAKER_TOKEN));

        handle.join().unwrap();
    }

    #[test]
    fn test_readiness_is_reported_for_pending_connection() {
        let mut mux = Multiplexer::new(64).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let token = Token(1);
        mux.register(&mut listener, token, Interest::READABLE)
            .unwrap();

        let _client = std::net::TcpStream::connect(addr).unwrap();

        let events = mux.poll(Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|e| e.token() == token && e.is_readable()));
    }
}
