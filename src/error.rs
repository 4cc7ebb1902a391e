use std::fmt;
use std::io;
use std::net::SocketAddr;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the event loop and its buffers.
///
/// Two conditions the loop encounters on purpose are *not* errors and have no
/// variant here: an accept that finds no pending connection after a readiness
/// report (handled as a no-op), and the zero-byte read that signals the peer
/// half-closed its output (handled as orderly teardown).
#[derive(Debug)]
pub enum Error {
    /// A write required more space than the cursor has left.
    CapacityExceeded { requested: usize, available: usize },
    /// `reset()` was called on a cursor with no mark set.
    MarkNotSet,
    /// The descriptor could not be registered with the poller.
    RegistrationFailed(io::Error),
    /// A listening or datagram socket could not be bound at startup.
    Bind { addr: SocketAddr, source: io::Error },
    /// I/O failure on the listening descriptor; fatal to the whole loop.
    Listener(io::Error),
    /// Any other I/O failure.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded {
                requested,
                available,
            } => write!(
                f,
                "Capacity Exceeded: {} bytes requested, {} available",
                requested, available
            ),
            Error::MarkNotSet => write!(f, "Reset Error: no mark is set"),
            Error::RegistrationFailed(e) => write!(f, "Registration Error: {}", e),
            Error::Bind { addr, source } => write!(f, "Bind Error: {}: {}", addr, source),
            Error::Listener(e) => write!(f, "Listener Error: {}", e),
            Error::Io(e) => write!(f, "IO Error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
