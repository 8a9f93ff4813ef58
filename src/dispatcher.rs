//! The single reader of the response ring.
//!
//! Replies are routed to the [`RequestTable`] by request id and watch events
//! to the [`WatchRegistry`] by token. Both handoffs only record and wake; the
//! dispatcher itself waits on nothing but the inbound ring.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::codec::Message;
use crate::codec::MessageType;
use crate::ProtocolError;
use crate::RequestTable;
use crate::Result;
use crate::RingTransport;
use crate::WatchRegistry;

pub(crate) struct Dispatcher {
    transport: Arc<RingTransport>,
    requests: Arc<RequestTable>,
    watches: Arc<WatchRegistry>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Arc<RingTransport>,
        requests: Arc<RequestTable>,
        watches: Arc<WatchRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            requests,
            watches,
            shutdown,
        }
    }

    /// Drains and routes inbound frames until cancelled. Returns an error
    /// only when the event channel fails.
    ///
    /// Closes the request table on the way out, whatever the reason, so no
    /// caller keeps waiting for a reply that will never be routed.
    pub(crate) async fn run(self) -> Result<()> {
        info!("dispatcher started");
        let result = self.serve().await;
        match &result {
            Ok(()) => self.requests.close("dispatcher stopped"),
            Err(e) => self.requests.close(&format!("dispatcher failed: {e}")),
        }
        result
    }

    async fn serve(&self) -> Result<()> {
        loop {
            // Bytes may already be waiting from before the handler was bound
            self.drain()?;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("dispatcher shutting down");
                    return Ok(());
                }
                _ = self.transport.wait_inbound() => {}
            }
        }
    }

    /// Routes every complete frame currently on the response ring and
    /// returns how many were routed. Notifies the peer when anything was
    /// consumed so a store blocked on a full ring can continue.
    pub(crate) fn drain(&self) -> Result<usize> {
        let mut routed = 0;
        let mut consumed = false;

        loop {
            match self.transport.read() {
                Ok(Some(msg)) => {
                    consumed = true;
                    routed += 1;
                    self.route(msg);
                }
                Ok(None) => break,
                Err(e @ (ProtocolError::OversizedPayload { .. } | ProtocolError::CursorOverrun { .. })) => {
                    // No frame boundary to resync on
                    let dropped = self.transport.discard_inbound();
                    error!(%e, dropped, "response ring unreadable; discarding pending bytes");
                    consumed = true;
                    break;
                }
                Err(e) => {
                    warn!(%e, "dropping malformed frame");
                    consumed = true;
                }
            }
        }

        if consumed {
            self.transport.notify_peer()?;
        }
        Ok(routed)
    }

    fn route(
        &self,
        msg: Message,
    ) {
        trace!(msg_type = %msg.msg_type(), req_id = msg.req_id(), len = msg.payload.len(), "frame received");

        if msg.msg_type() == MessageType::WatchEvent {
            match msg.watch_event_parts() {
                Ok((path, token)) => {
                    debug!(%path, %token, "watch event");
                    self.watches.deliver(path, token);
                }
                Err(e) => warn!(%e, "dropping malformed watch event"),
            }
            return;
        }

        let id = msg.req_id();
        if let Err(e) = self.requests.deliver(id, msg) {
            warn!(%e, "dropping reply");
        }
    }
}
