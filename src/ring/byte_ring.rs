use std::sync::Arc;

use tracing::trace;

use super::Direction;
use super::RingIdx;
use super::SharedRing;
use crate::codec::declared_len;
use crate::codec::Message;
use crate::constants::HEADER_SIZE;
use crate::constants::RING_SIZE;
use crate::ProtocolError;

/// One direction of the shared page, used either as producer or consumer.
#[derive(Clone)]
pub struct ByteRing {
    page: Arc<dyn SharedRing>,
    dir: Direction,
}

impl ByteRing {
    pub fn new(
        page: Arc<dyn SharedRing>,
        dir: Direction,
    ) -> Self {
        Self { page, dir }
    }

    pub fn direction(&self) -> Direction {
        self.dir
    }

    pub fn produced(&self) -> RingIdx {
        RingIdx(self.page.load_produced(self.dir))
    }

    pub fn consumed(&self) -> RingIdx {
        RingIdx(self.page.load_consumed(self.dir))
    }

    /// Bytes written but not yet consumed.
    pub fn pending(&self) -> Result<usize, ProtocolError> {
        let consumed = self.consumed();
        let produced = self.produced();
        let pending = produced.distance_from(consumed);
        if pending > RING_SIZE {
            return Err(ProtocolError::CursorOverrun {
                produced: produced.0,
                consumed: consumed.0,
            });
        }
        Ok(pending)
    }

    pub fn free_space(&self) -> Result<usize, ProtocolError> {
        Ok(RING_SIZE - self.pending()?)
    }

    /// Copies `frame` into the ring and publishes it. Returns `false` without
    /// touching the ring when there is not enough free space yet.
    pub fn try_push(
        &self,
        frame: &[u8],
    ) -> Result<bool, ProtocolError> {
        if frame.len() > RING_SIZE {
            return Err(ProtocolError::FrameTooLarge { len: frame.len() });
        }
        if self.free_space()? < frame.len() {
            return Ok(false);
        }

        let produced = self.produced();
        let (first, second) = produced.split(frame.len());
        let (head, tail) = frame.split_at(first.len());
        self.page.copy_in(self.dir, first.start, head);
        if !second.is_empty() {
            self.page.copy_in(self.dir, second.start, tail);
        }

        let next = produced.advance(frame.len());
        self.page.store_produced(self.dir, next.0);
        trace!(dir = ?self.dir, produced = next.0, len = frame.len(), "frame published");
        Ok(true)
    }

    /// Takes the next complete frame off the ring.
    ///
    /// Returns `Ok(None)` while fewer bytes than a whole frame are pending;
    /// `consumed` only ever moves past complete frames. A frame with an
    /// unknown type is consumed and reported as an error.
    pub fn try_pop(&self) -> Result<Option<Message>, ProtocolError> {
        let pending = self.pending()?;
        if pending < HEADER_SIZE {
            return Ok(None);
        }

        let consumed = self.consumed();
        let mut header = [0u8; HEADER_SIZE];
        self.copy_out_at(consumed, &mut header);

        let len = declared_len(&header);
        if len as usize > RING_SIZE - HEADER_SIZE {
            return Err(ProtocolError::OversizedPayload { len });
        }
        let frame_len = HEADER_SIZE + len as usize;
        if pending < frame_len {
            trace!(dir = ?self.dir, pending, frame_len, "partial frame");
            return Ok(None);
        }

        let mut frame = vec![0u8; frame_len];
        self.copy_out_at(consumed, &mut frame);
        self.page.store_consumed(self.dir, consumed.advance(frame_len).0);

        Message::decode(&frame).map(Some)
    }

    /// Drops every pending byte. Used to resynchronise after a frame that can
    /// never be parsed. Returns the number of bytes dropped.
    pub fn discard_pending(&self) -> usize {
        let produced = self.produced();
        let dropped = produced.distance_from(self.consumed());
        self.page.store_consumed(self.dir, produced.0);
        dropped
    }

    fn copy_out_at(
        &self,
        at: RingIdx,
        dst: &mut [u8],
    ) {
        let (first, second) = at.split(dst.len());
        let (head, tail) = dst.split_at_mut(first.len());
        self.page.copy_out(self.dir, first.start, head);
        if !second.is_empty() {
            self.page.copy_out(self.dir, second.start, tail);
        }
    }
}
