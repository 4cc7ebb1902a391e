//! Fixed-capacity byte container used to stage all socket I/O.
//!
//! A [`ByteCursor`] is a flat byte array with an explicit `position` and
//! `limit`, operated in one of two modes that are never active at once:
//!
//! - **fill**: incoming bytes are written between `position` and `limit`
//!   (`limit == capacity`);
//! - **drain**: staged bytes are read between `position` and `limit`
//!   (`limit == amount valid`).
//!
//! [`flip_to_drain`](ByteCursor::flip_to_drain) moves from fill to drain by
//! setting `limit = position; position = 0`; [`flip_to_fill`](ByteCursor::flip_to_fill)
//! resets to an empty fill-mode cursor. The ordering invariant
//! `0 <= mark <= position <= limit <= capacity` holds at all times.
//!
//! Capacity is fixed at creation. There is no implicit growth: a caller that
//! requires all of its bytes staged gets [`Error::CapacityExceeded`] instead.

use crate::error::{Error, Result};

pub struct ByteCursor {
    data: Box<[u8]>,
    position: usize,
    limit: usize,
    mark: Option<usize>,
}

impl ByteCursor {
    /// Creates a cursor in fill mode: `position = 0`, `limit = capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            limit: capacity,
            mark: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left between `position` and `limit`: writable space in fill
    /// mode, unread bytes in drain mode.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Copies as many bytes of `src` as fit, advancing `position`.
    /// Returns the number copied, which may be short or zero.
    pub fn write_bytes(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining());
        self.data[self.position..self.position + n].copy_from_slice(&src[..n]);
        self.position += n;
        n
    }

    /// Copies all of `src`, or fails with [`Error::CapacityExceeded`] without
    /// consuming anything.
    pub fn write_all_bytes(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.remaining() {
            return Err(Error::CapacityExceeded {
                requested: src.len(),
                available: self.remaining(),
            });
        }
        self.write_bytes(src);
        Ok(())
    }

    /// Returns up to `count` bytes starting at `position`, advancing past
    /// them. Returns fewer than requested if less is staged; never blocks.
    pub fn read_bytes(&mut self, count: usize) -> &[u8] {
        let n = count.min(self.remaining());
        let start = self.position;
        self.position += n;
        &self.data[start..start + n]
    }

    /// The unwritten region between `position` and `limit`, for handing
    /// directly to a socket read. Pair with [`advance`](Self::advance).
    pub fn unfilled_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    /// Advances `position` by `count` bytes written externally via
    /// [`unfilled_mut`](Self::unfilled_mut).
    pub fn advance(&mut self, count: usize) -> Result<()> {
        if count > self.remaining() {
            return Err(Error::CapacityExceeded {
                requested: count,
                available: self.remaining(),
            });
        }
        self.position += count;
        Ok(())
    }

    /// Switches from fill to drain mode: `limit = position; position = 0`.
    /// The mark is discarded.
    pub fn flip_to_drain(&mut self) {
        self.limit = self.position;
        self.position = 0;
        self.mark = None;
    }

    /// Switches back to an empty fill-mode cursor: `position = 0`,
    /// `limit = capacity`. The staged bytes are forgotten, not erased.
    pub fn flip_to_fill(&mut self) {
        self.position = 0;
        self.limit = self.data.len();
        self.mark = None;
    }

    /// Rewinds `position` to zero without touching `limit`, so drained bytes
    /// can be read again.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.mark = None;
    }

    /// Records the current `position` for a later [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Restores `position` to the mark.
    pub fn reset(&mut self) -> Result<()> {
        match self.mark {
            Some(mark) => {
                self.position = mark;
                Ok(())
            }
            None => Err(Error::MarkNotSet),
        }
    }
}

impl std::fmt::Debug for ByteCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteCursor")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.data.len())
            .finish()
    }
}
