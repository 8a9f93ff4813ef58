//! Byte ring transport over the shared xenstore page
//!
//! The page holds two [`RING_SIZE`] byte arrays, one per direction, each with
//! a `produced` and a `consumed` cursor. Cursors grow monotonically and wrap
//! at `u32::MAX`; the byte at absolute offset `i` lives at
//! `buffer[i mod RING_SIZE]`. For both rings `produced - consumed` never
//! exceeds `RING_SIZE`.
//!
//! - [`RingIdx`] does the cursor arithmetic and splits a copy at the wrap
//!   boundary.
//! - [`ByteRing`] is one direction of the page seen as a frame queue.
//! - [`RingTransport`] pairs the two directions with the event channel and
//!   handles flow control.

mod byte_ring;
mod channel;
mod page;
mod transport;

pub use byte_ring::*;
pub use channel::*;
pub use page::*;
pub use transport::*;

#[cfg(test)]
mod transport_test;

use std::ops::Range;

use crate::constants::RING_SIZE;

/// Which of the two rings in the shared page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Guest to store daemon
    Request,
    /// Store daemon to guest
    Response,
}

/// A ring cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingIdx(pub u32);

impl RingIdx {
    /// Position of this cursor inside the ring buffer.
    pub fn offset(self) -> usize {
        (self.0 as usize) & (RING_SIZE - 1)
    }

    pub fn advance(
        self,
        n: usize,
    ) -> RingIdx {
        RingIdx(self.0.wrapping_add(n as u32))
    }

    /// Number of bytes between `earlier` and this cursor.
    pub fn distance_from(
        self,
        earlier: RingIdx,
    ) -> usize {
        self.0.wrapping_sub(earlier.0) as usize
    }

    /// Buffer ranges covering `len` bytes starting at this cursor. The second
    /// range is empty unless the run crosses the physical end of the buffer.
    pub fn split(
        self,
        len: usize,
    ) -> (Range<usize>, Range<usize>) {
        debug_assert!(len <= RING_SIZE);
        let off = self.offset();
        let first = len.min(RING_SIZE - off);
        (off..off + first, 0..len - first)
    }
}

const _: () = assert!(RING_SIZE.is_power_of_two());
