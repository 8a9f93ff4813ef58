//! Watch registration and the helpers that block on watch events.

use tracing::debug;

use super::Xenbus;
use super::XenbusState;
use crate::codec::nul_terminated;
use crate::codec::MessageType;
use crate::codec::TransactionId;
use crate::Error;
use crate::RemoteError;
use crate::Result;
use crate::WatchEvent;
use crate::WatchQueue;

impl Xenbus {
    /// Watches `path` and everything below it. Events carry `token` and go
    /// to `queue`, or to the shared default queue when `None`.
    ///
    /// The registration exists before the WATCH request is sent, so an
    /// event fired while the request is in flight is not lost. It is
    /// removed again if the store refuses the watch.
    pub async fn watch(
        &self,
        path: &str,
        token: &str,
        queue: Option<WatchQueue>,
    ) -> Result<()> {
        let queue = queue.unwrap_or_else(|| self.default_watch_queue());
        let rpc = async {
            self.request(
                MessageType::Watch,
                TransactionId::NIL,
                &[nul_terminated(path).as_slice(), nul_terminated(token).as_slice()],
            )
            .await
            .map(|_| ())
        };
        self.inner.watches.register(token, queue, rpc).await
    }

    /// Cancels the watch on `path` registered under `token`. Removes one
    /// registration once the store confirms.
    pub async fn unwatch(
        &self,
        path: &str,
        token: &str,
    ) -> Result<()> {
        let rpc = async {
            self.request(
                MessageType::Unwatch,
                TransactionId::NIL,
                &[nul_terminated(path).as_slice(), nul_terminated(token).as_slice()],
            )
            .await
            .map(|_| ())
        };
        self.inner.watches.unregister(token, rpc).await
    }

    /// Queue that receives events for watches registered without one.
    pub fn default_watch_queue(&self) -> WatchQueue {
        self.inner.watches.default_queue().clone()
    }

    /// Waits for the next event on `queue` (default queue when `None`).
    pub async fn wait_for_watch(
        &self,
        queue: Option<&WatchQueue>,
    ) -> WatchEvent {
        match queue {
            Some(queue) => queue.wait().await,
            None => self.inner.watches.default_queue().wait().await,
        }
    }

    /// Waits until `path` holds exactly `value`. Re-reads after every event
    /// on `queue`, so the caller must already watch `path`.
    pub async fn wait_for_value(
        &self,
        path: &str,
        value: &str,
        queue: Option<&WatchQueue>,
    ) -> Result<()> {
        loop {
            let current = self.read_string(TransactionId::NIL, path).await?;
            if current == value {
                return Ok(());
            }
            debug!(%path, %current, wanted = %value, "value not reached yet");
            self.wait_for_watch(queue).await;
        }
    }

    /// Waits until the state stored at `path` differs from `*state`, then
    /// stores the new state in `*state`. Like [`Xenbus::wait_for_value`],
    /// `path` must already be watched.
    pub async fn wait_for_state_change(
        &self,
        path: &str,
        state: &mut XenbusState,
        queue: Option<&WatchQueue>,
    ) -> Result<()> {
        loop {
            let raw = self.read_integer(path).await?;
            let current = XenbusState::try_from(raw).map_err(|_| Error::Remote(RemoteError::Invalid))?;
            if current != *state {
                debug!(%path, from = %state, to = %current, "state changed");
                *state = current;
                return Ok(());
            }
            self.wait_for_watch(queue).await;
        }
    }
}
