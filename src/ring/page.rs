use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use super::Direction;
use crate::constants::RING_SIZE;

/// Access to the shared page acquired at start-of-day.
///
/// Cursor loads must have acquire semantics and cursor stores release
/// semantics: a reader that observes a new `produced` value must also observe
/// the bytes written before it, and a writer must finish its copy before the
/// new `produced` value becomes visible.
///
/// `copy_in` / `copy_out` are only ever called with ranges inside
/// `0..RING_SIZE`.
pub trait SharedRing: Send + Sync + 'static {
    fn load_produced(
        &self,
        dir: Direction,
    ) -> u32;

    fn load_consumed(
        &self,
        dir: Direction,
    ) -> u32;

    fn store_produced(
        &self,
        dir: Direction,
        value: u32,
    );

    fn store_consumed(
        &self,
        dir: Direction,
        value: u32,
    );

    fn copy_in(
        &self,
        dir: Direction,
        offset: usize,
        src: &[u8],
    );

    fn copy_out(
        &self,
        dir: Direction,
        offset: usize,
        dst: &mut [u8],
    );
}

struct RingHalf {
    buf: Mutex<[u8; RING_SIZE]>,
    produced: AtomicU32,
    consumed: AtomicU32,
}

impl RingHalf {
    fn new() -> Self {
        Self {
            buf: Mutex::new([0; RING_SIZE]),
            produced: AtomicU32::new(0),
            consumed: AtomicU32::new(0),
        }
    }
}

/// In-process shared page. Both ends of the protocol may hold it through an
/// `Arc`; used when the store daemon runs in the same address space.
pub struct RingPage {
    req: RingHalf,
    rsp: RingHalf,
}

impl RingPage {
    pub fn new() -> Self {
        Self {
            req: RingHalf::new(),
            rsp: RingHalf::new(),
        }
    }

    /// Page whose cursors all start at `start`, e.g. close to `u32::MAX` to
    /// exercise cursor wrap.
    pub fn with_cursors(start: u32) -> Self {
        let page = Self::new();
        for half in [&page.req, &page.rsp] {
            half.produced.store(start, Ordering::Relaxed);
            half.consumed.store(start, Ordering::Relaxed);
        }
        page
    }

    fn half(
        &self,
        dir: Direction,
    ) -> &RingHalf {
        match dir {
            Direction::Request => &self.req,
            Direction::Response => &self.rsp,
        }
    }
}

impl Default for RingPage {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedRing for RingPage {
    fn load_produced(
        &self,
        dir: Direction,
    ) -> u32 {
        self.half(dir).produced.load(Ordering::Acquire)
    }

    fn load_consumed(
        &self,
        dir: Direction,
    ) -> u32 {
        self.half(dir).consumed.load(Ordering::Acquire)
    }

    fn store_produced(
        &self,
        dir: Direction,
        value: u32,
    ) {
        self.half(dir).produced.store(value, Ordering::Release);
    }

    fn store_consumed(
        &self,
        dir: Direction,
        value: u32,
    ) {
        self.half(dir).consumed.store(value, Ordering::Release);
    }

    fn copy_in(
        &self,
        dir: Direction,
        offset: usize,
        src: &[u8],
    ) {
        self.half(dir).buf.lock()[offset..offset + src.len()].copy_from_slice(src);
    }

    fn copy_out(
        &self,
        dir: Direction,
        offset: usize,
        dst: &mut [u8],
    ) {
        dst.copy_from_slice(&self.half(dir).buf.lock()[offset..offset + dst.len()]);
    }
}
