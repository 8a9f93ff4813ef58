use std::fmt;

use tracing::debug;

use super::Xenbus;
use crate::codec::TransactionId;
use crate::Error;
use crate::RemoteError;
use crate::Result;

/// Connection state a frontend or backend publishes in its `state` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum XenbusState {
    Unknown = 0,
    Initialising = 1,
    /// Waiting for the other end to publish details before initialising
    InitWait = 2,
    /// Details published; waiting for the other end to connect
    Initialised = 3,
    Connected = 4,
    /// Device is being torn down
    Closing = 5,
    Closed = 6,
    Reconfiguring = 7,
    Reconfigured = 8,
}

impl TryFrom<i64> for XenbusState {
    type Error = i64;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            0 => XenbusState::Unknown,
            1 => XenbusState::Initialising,
            2 => XenbusState::InitWait,
            3 => XenbusState::Initialised,
            4 => XenbusState::Connected,
            5 => XenbusState::Closing,
            6 => XenbusState::Closed,
            7 => XenbusState::Reconfiguring,
            8 => XenbusState::Reconfigured,
            other => return Err(other),
        })
    }
}

impl fmt::Display for XenbusState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Xenbus {
    /// Publishes `state` at `path` unless it is already there.
    ///
    /// With [`TransactionId::NIL`] the read and the write run in a
    /// transaction of their own that is retried on conflict; otherwise both
    /// happen inside `txn` and the caller owns the commit.
    pub async fn switch_state(
        &self,
        txn: TransactionId,
        path: &str,
        state: XenbusState,
    ) -> Result<()> {
        if txn.is_nil() {
            self.transactions()
                .run(move |txn| self.switch_state_in(txn, path, state))
                .await
        } else {
            self.switch_state_in(txn, path, state).await
        }
    }

    async fn switch_state_in(
        &self,
        txn: TransactionId,
        path: &str,
        state: XenbusState,
    ) -> Result<()> {
        let raw: i64 = self.read_parsed(txn, path).await?;
        let current = XenbusState::try_from(raw).map_err(|_| Error::Remote(RemoteError::Invalid))?;
        if current == state {
            return Ok(());
        }
        debug!(%path, from = %current, to = %state, "switching state");
        self.write(txn, path, (state as u32).to_string()).await
    }
}
