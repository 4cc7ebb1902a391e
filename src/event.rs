use mio::{Token, event::Event};
use std::fmt;

/// Readiness kinds the dispatcher distinguishes, replacing the poller's
/// readable/writable flags with an explicit set. `Acceptable` is a readable
/// report on a listening descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyKind {
    Acceptable,
    Readable,
    Writable,
}

/// Snapshot of one ready event from a poll call. Ephemeral: produced by one
/// poll, consumed by the same loop iteration, never persisted.
#[derive(Clone, Copy)]
pub struct IoEvent {
    token: Token,
    is_readable: bool,
    is_writable: bool,
}

impl fmt::Debug for IoEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoEvent")
            .field("token", &self.token)
            .field("is_readable", &self.is_readable)
            .field("is_writable", &self.is_writable)
            .finish()
    }
}

impl IoEvent {
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn is_readable(&self) -> bool {
        self.is_readable
    }

    pub fn is_writable(&self) -> bool {
        self.is_writable
    }
}

impl From<&Event> for IoEvent {
    fn from(event: &Event) -> Self {
        Self {
            token: event.token(),
            is_readable: event.is_readable(),
            is_writable: event.is_writable(),
        }
    }
}
