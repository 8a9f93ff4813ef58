use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use tracing::trace;

use super::ByteRing;
use super::Direction;
use super::EventChannel;
use super::SharedRing;
use crate::codec::Message;
use crate::ProtocolError;
use crate::Result;

/// Which end of the protocol this transport drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Writes requests, reads responses
    Guest,
    /// Reads requests, writes responses
    Store,
}

/// Moves whole frames between this process and the shared page.
///
/// Writers are serialised by a FIFO lock held for the whole frame, so frames
/// never interleave and are published in call order. At most one writer is
/// ever parked waiting for space, and only the dispatcher waits for inbound
/// bytes, so each wake from [`RingTransport::handle_notification`] targets
/// exactly one task.
pub struct RingTransport {
    outbound: ByteRing,
    inbound: ByteRing,
    channel: Arc<dyn EventChannel>,
    write_lock: Mutex<()>,
    space_available: Notify,
    inbound_ready: Notify,
}

impl RingTransport {
    pub fn new(
        page: Arc<dyn SharedRing>,
        channel: Arc<dyn EventChannel>,
        side: Side,
    ) -> Self {
        let (out_dir, in_dir) = match side {
            Side::Guest => (Direction::Request, Direction::Response),
            Side::Store => (Direction::Response, Direction::Request),
        };
        Self {
            outbound: ByteRing::new(page.clone(), out_dir),
            inbound: ByteRing::new(page, in_dir),
            channel,
            write_lock: Mutex::new(()),
            space_available: Notify::new(),
            inbound_ready: Notify::new(),
        }
    }

    /// Routes peer notifications on the event channel to this transport.
    pub fn bind(self: &Arc<Self>) -> Result<()> {
        let transport = Arc::downgrade(self);
        self.channel.bind(Box::new(move || {
            if let Some(transport) = transport.upgrade() {
                transport.handle_notification();
            }
        }))
    }

    /// Wakes the inbound reader and the writer parked on ring space, if any.
    pub fn handle_notification(&self) {
        self.inbound_ready.notify_one();
        self.space_available.notify_one();
    }

    /// Publishes `msg` on the outbound ring, waiting for the peer to free
    /// space when needed, then notifies the peer.
    pub async fn write(
        &self,
        msg: &Message,
    ) -> Result<()> {
        self.publish(msg).await?;
        self.notify_peer()
    }

    /// Publishes `msg` without notifying the peer. Once this returns `Ok` the
    /// frame is on the ring whether or not a later notification succeeds.
    pub async fn publish(
        &self,
        msg: &Message,
    ) -> Result<()> {
        let frame = msg.encode()?;

        let _guard = self.write_lock.lock().await;
        while !self.outbound.try_push(&frame)? {
            debug!(
                produced = self.outbound.produced().0,
                consumed = self.outbound.consumed().0,
                len = frame.len(),
                "outbound ring full; waiting"
            );
            self.space_available.notified().await;
        }
        trace!(
            msg_type = %msg.msg_type(),
            req_id = msg.req_id(),
            len = frame.len(),
            "frame written"
        );
        Ok(())
    }

    /// Next complete inbound frame, if one is available. Never waits.
    pub fn read(&self) -> std::result::Result<Option<Message>, ProtocolError> {
        self.inbound.try_pop()
    }

    /// Waits until the peer signals; pairs with [`RingTransport::read`].
    pub async fn wait_inbound(&self) {
        self.inbound_ready.notified().await;
    }

    pub fn has_unread(&self) -> bool {
        matches!(self.inbound.pending(), Ok(n) if n > 0)
    }

    /// Drops all pending inbound bytes.
    pub fn discard_inbound(&self) -> usize {
        self.inbound.discard_pending()
    }

    pub fn notify_peer(&self) -> Result<()> {
        self.channel.notify()
    }

    pub fn outbound(&self) -> &ByteRing {
        &self.outbound
    }

    pub fn inbound(&self) -> &ByteRing {
        &self.inbound
    }
}
