use std::future::Future;

use dashmap::DashMap;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::WatchEvent;
use super::WatchQueue;
use crate::Result;
use crate::WatchConfig;

/// Active watch registrations, keyed by token.
///
/// A token may be registered more than once; the most recent registration
/// receives the events and is the one an unregister removes.
#[derive(Debug)]
pub struct WatchRegistry {
    entries: DashMap<String, Vec<WatchQueue>>,
    default_queue: WatchQueue,
    queue_soft_limit: usize,
}

impl WatchRegistry {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            entries: DashMap::new(),
            default_queue: WatchQueue::new(),
            queue_soft_limit: config.queue_soft_limit,
        }
    }

    /// Queue used when a watch is registered without one.
    pub fn default_queue(&self) -> &WatchQueue {
        &self.default_queue
    }

    /// Records `(token, queue)` and then runs the WATCH `rpc`.
    ///
    /// The entry exists before the request is sent, so an event the store
    /// fires as soon as it accepts the watch is never reported as an
    /// unexpected token. If the request fails the entry is removed again.
    pub async fn register<Fut>(
        &self,
        token: &str,
        queue: WatchQueue,
        rpc: Fut,
    ) -> Result<()>
    where
        Fut: Future<Output = Result<()>>,
    {
        self.insert(token, queue.clone());
        if let Err(e) = rpc.await {
            debug!(token, "watch request failed; rolling back registration");
            self.remove_queue(token, &queue);
            return Err(e);
        }
        Ok(())
    }

    /// Runs the UNWATCH `rpc` and, once it succeeds, removes the most recent
    /// registration of `token`.
    pub async fn unregister<Fut>(
        &self,
        token: &str,
        rpc: Fut,
    ) -> Result<()>
    where
        Fut: Future<Output = Result<()>>,
    {
        rpc.await?;
        if !self.remove_latest(token) {
            warn!(token, "unwatch for token with no registration");
        }
        Ok(())
    }

    pub fn insert(
        &self,
        token: &str,
        queue: WatchQueue,
    ) {
        self.entries.entry(token.to_string()).or_default().push(queue);
        trace!(token, "watch registered");
    }

    /// Removes the most recent registration of `token`.
    pub fn remove_latest(
        &self,
        token: &str,
    ) -> bool {
        self.remove_where(token, |queues| queues.len().checked_sub(1))
    }

    /// Removes the most recent registration of `token` on `queue`.
    pub fn remove_queue(
        &self,
        token: &str,
        queue: &WatchQueue,
    ) -> bool {
        self.remove_where(token, |queues| queues.iter().rposition(|q| q.same_queue(queue)))
    }

    fn remove_where(
        &self,
        token: &str,
        pick: impl FnOnce(&[WatchQueue]) -> Option<usize>,
    ) -> bool {
        let removed = match self.entries.get_mut(token) {
            Some(mut queues) => match pick(&queues) {
                Some(pos) => {
                    queues.remove(pos);
                    true
                }
                None => false,
            },
            None => false,
        };
        self.entries.remove_if(token, |_, queues| queues.is_empty());
        removed
    }

    /// Queues an event for the listener registered under `token`. Never
    /// waits. Returns false, after logging, when no registration matches.
    pub fn deliver(
        &self,
        path: String,
        token: String,
    ) -> bool {
        let queue = self.entries.get(&token).and_then(|queues| queues.last().cloned());
        let Some(queue) = queue else {
            warn!(%token, %path, "unexpected watch token; event dropped");
            return false;
        };

        let len = queue.push(WatchEvent { path, token });
        if len > self.queue_soft_limit {
            warn!(len, limit = self.queue_soft_limit, "watch queue is not being drained");
        }
        true
    }

    pub fn is_registered(
        &self,
        token: &str,
    ) -> bool {
        self.entries.contains_key(token)
    }

    /// Number of registrations for `token`.
    pub fn registration_count(
        &self,
        token: &str,
    ) -> usize {
        self.entries.get(token).map(|q| q.len()).unwrap_or(0)
    }

    /// Number of distinct registered tokens.
    pub fn token_count(&self) -> usize {
        self.entries.len()
    }

    /// Drops every registration. Queued events stay with their queues.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
