use std::future::Future;

use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use super::Xenbus;
use crate::codec::nul_terminated;
use crate::codec::MessageType;
use crate::codec::TransactionId;
use crate::BackoffPolicy;
use crate::Error;
use crate::ProtocolError;
use crate::RemoteError;
use crate::Result;

impl Xenbus {
    /// Opens a transaction and returns its id.
    pub async fn transaction_start(&self) -> Result<TransactionId> {
        let reply = self
            .request(
                MessageType::TransactionStart,
                TransactionId::NIL,
                &[nul_terminated("").as_slice()],
            )
            .await?;

        let text = std::str::from_utf8(&reply.payload)
            .map_err(|e| ProtocolError::MalformedPayload(format!("transaction id is not ASCII: {e}")))?;
        let id = text
            .trim_end_matches('\0')
            .parse::<u32>()
            .map_err(|e| ProtocolError::MalformedPayload(format!("bad transaction id {text:?}: {e}")))?;
        debug!(txn = id, "transaction started");
        Ok(TransactionId(id))
    }

    /// Commits (`abort == false`) or aborts `txn`.
    ///
    /// Returns `true` when the commit conflicted with a concurrent change
    /// and the whole transaction has to be run again. Nothing written under
    /// `txn` is visible in that case.
    pub async fn transaction_end(
        &self,
        txn: TransactionId,
        abort: bool,
    ) -> Result<bool> {
        let flag = if abort { "F" } else { "T" };
        match self
            .request(MessageType::TransactionEnd, txn, &[nul_terminated(flag).as_slice()])
            .await
        {
            Ok(_) => Ok(false),
            Err(Error::Remote(RemoteError::Conflict)) => {
                debug!(%txn, "transaction conflicted");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Coordinator using the configured transaction retry policy.
    pub fn transactions(&self) -> TransactionCoordinator {
        TransactionCoordinator::new(self.clone())
    }
}

/// Runs a unit of work inside a transaction and re-runs it from a fresh
/// transaction whenever the commit conflicts.
///
/// ```text
/// NoTxn --begin--> Active --end(ok)--------> NoTxn
///                    |----end(conflict)----> NoTxn, retry
/// ```
pub struct TransactionCoordinator {
    bus: Xenbus,
    policy: BackoffPolicy,
}

impl TransactionCoordinator {
    pub fn new(bus: Xenbus) -> Self {
        let policy = bus.config().retry.transaction;
        Self { bus, policy }
    }

    pub fn with_policy(
        mut self,
        policy: BackoffPolicy,
    ) -> Self {
        self.policy = policy;
        self
    }

    pub async fn begin(&self) -> Result<TransactionId> {
        self.bus.transaction_start().await
    }

    /// See [`Xenbus::transaction_end`].
    pub async fn end(
        &self,
        txn: TransactionId,
        abort: bool,
    ) -> Result<bool> {
        self.bus.transaction_end(txn, abort).await
    }

    /// begin -> `body(txn)` -> end. The transaction is aborted when `body`
    /// fails and committed otherwise; `end` is attempted either way. A
    /// conflicting commit, or a conflict reported to `body`, re-runs `body`
    /// under a new transaction after the policy's backoff delay.
    ///
    /// # Errors
    /// - the error `body` returned, after the abort
    /// - [`Error::RetriesExhausted`] when the policy allows no more attempts
    pub async fn run<F, Fut, T>(
        &self,
        mut body: F,
    ) -> Result<T>
    where
        F: FnMut(TransactionId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let txn = self.begin().await?;

            match body(txn).await {
                Ok(value) => {
                    if !self.end(txn, false).await? {
                        debug!(%txn, attempts, "transaction committed");
                        return Ok(value);
                    }
                }
                Err(e) => {
                    if let Err(end_err) = self.end(txn, true).await {
                        warn!(%txn, "abort after failed body also failed: {:?}", end_err);
                    }
                    if !e.is_conflict() {
                        return Err(e);
                    }
                }
            }

            if self.policy.exhausted(attempts) {
                warn!(attempts, "transaction still conflicting; giving up");
                return Err(Error::RetriesExhausted(attempts));
            }
            let delay = self.policy.delay_for(attempts);
            debug!(%txn, attempts, ?delay, "retrying transaction");
            sleep(delay).await;
        }
    }
}
