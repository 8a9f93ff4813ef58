use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::codec::Message;
use crate::codec::MessageType;
use crate::codec::TransactionId;
use crate::dispatcher::Dispatcher;
use crate::utils::async_task::spawn_task;
use crate::Error;
use crate::EventChannel;
use crate::ProtocolError;
use crate::RemoteError;
use crate::RequestId;
use crate::RequestTable;
use crate::Result;
use crate::RingTransport;
use crate::SharedRing;
use crate::Side;
use crate::WatchRegistry;
use crate::XenbusConfig;

const SHUT_DOWN: &str = "xenbus client shut down";

/// Handle to a running xenbus subsystem.
///
/// Cheap to clone; all clones share the rings, the request table, the watch
/// registry and the dispatcher task.
#[derive(Clone)]
pub struct Xenbus {
    pub(super) inner: Arc<XenbusInner>,
}

pub(super) struct XenbusInner {
    pub(super) transport: Arc<RingTransport>,
    pub(super) requests: Arc<RequestTable>,
    pub(super) watches: Arc<WatchRegistry>,
    pub(super) config: XenbusConfig,
    pub(super) shutdown: CancellationToken,
    pub(super) dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Xenbus {
    /// Brings the subsystem up on an already mapped page: binds the
    /// notification handler and spawns the dispatcher.
    ///
    /// # Errors
    /// - [`Error::Config`] when `config` fails validation
    /// - [`Error::Fatal`] when the event channel cannot be bound
    pub async fn start(
        page: Arc<dyn SharedRing>,
        channel: Arc<dyn EventChannel>,
        config: XenbusConfig,
    ) -> Result<Self> {
        let config = config.validate()?;

        let transport = Arc::new(RingTransport::new(page, channel, Side::Guest));
        transport.bind()?;

        let requests = Arc::new(RequestTable::new());
        let watches = Arc::new(WatchRegistry::new(&config.watch));
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher::new(
            transport.clone(),
            requests.clone(),
            watches.clone(),
            shutdown.clone(),
        );
        let handle = spawn_task("xenbus-dispatcher", move || dispatcher.run());

        let bus = Self {
            inner: Arc::new(XenbusInner {
                transport,
                requests,
                watches,
                config,
                shutdown,
                dispatcher: Mutex::new(Some(handle)),
            }),
        };
        info!("xenbus client started");

        if bus.inner.config.client.announce_on_start {
            bus.debug("xenbus client started").await?;
        }
        Ok(bus)
    }

    /// Stops the dispatcher and drops every watch registration. Requests
    /// still waiting for a reply, and any issued afterwards, fail with
    /// [`Error::Fatal`].
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.requests.close(SHUT_DOWN);
        self.inner.watches.clear();

        let handle = self.inner.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("dispatcher task ended abnormally: {:?}", e);
            }
        }
        info!("xenbus client stopped");
    }

    pub fn config(&self) -> &XenbusConfig {
        &self.inner.config
    }

    /// Number of requests currently waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.inner.requests.in_flight()
    }

    /// Sends one request built from `segments` and waits for its reply.
    ///
    /// allocate id -> write -> wait reply -> release id. An `ERROR` reply
    /// becomes [`Error::Remote`]; a reply of any other unexpected type is a
    /// [`ProtocolError::UnexpectedReply`]. Fails with [`Error::Fatal`] once
    /// the client is shut down or the dispatcher has stopped.
    pub(crate) async fn request(
        &self,
        msg_type: MessageType,
        txn: TransactionId,
        segments: &[&[u8]],
    ) -> Result<Message> {
        let requests = &self.inner.requests;
        let mut slot = InFlight::new(requests, requests.allocate().await?);

        let msg = Message::from_segments(msg_type, slot.id, txn, segments);
        debug!(%msg_type, req_id = slot.id, %txn, len = msg.payload.len(), "sending request");
        self.inner.transport.publish(&msg).await?;
        // On the ring now: a reply may arrive even if the notify below fails
        slot.sent = true;
        self.inner.transport.notify_peer()?;

        let reply = match self.inner.config.client.request_timeout() {
            None => requests.take_reply(slot.id).await?,
            Some(duration) => timeout(duration, requests.take_reply(slot.id))
                .await
                .map_err(|_| Error::Timeout {
                    request_id: slot.id,
                    duration,
                })??,
        };
        slot.finish();

        debug!(msg_type = %reply.msg_type(), req_id = reply.req_id(), len = reply.payload.len(), "reply received");
        check_reply(msg_type, reply)
    }
}

/// Owns a request id for the span of one request. An id whose request never
/// reached the ring is released on drop; one that did is abandoned so it
/// stays reserved until the reply shows up.
struct InFlight<'a> {
    table: &'a RequestTable,
    id: RequestId,
    sent: bool,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn new(
        table: &'a RequestTable,
        id: RequestId,
    ) -> Self {
        Self {
            table,
            id,
            sent: false,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.table.release(self.id);
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if self.sent {
            self.table.abandon(self.id);
        } else {
            self.table.release(self.id);
        }
    }
}

fn check_reply(
    expected: MessageType,
    reply: Message,
) -> Result<Message> {
    match reply.msg_type() {
        MessageType::Error => {
            let code = reply.error_code()?;
            Err(RemoteError::from_code(code).into())
        }
        actual if actual == expected => Ok(reply),
        actual => Err(ProtocolError::UnexpectedReply {
            expected: expected.as_str(),
            actual: actual.as_str(),
        }
        .into()),
    }
}
