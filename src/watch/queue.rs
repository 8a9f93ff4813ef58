use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A path change reported by the store daemon for a registered token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub token: String,
}

#[derive(Default)]
struct QueueInner {
    events: Mutex<VecDeque<WatchEvent>>,
    ready: Notify,
}

/// FIFO of watch events for one listener.
///
/// Cloning yields another handle to the same queue; several registrations
/// may share one queue. Each event is handed to exactly one waiter.
#[derive(Clone, Default)]
pub struct WatchQueue {
    inner: Arc<QueueInner>,
}

impl WatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` and wakes one waiter. Returns the new queue length.
    pub(crate) fn push(
        &self,
        event: WatchEvent,
    ) -> usize {
        let len = {
            let mut events = self.inner.events.lock();
            events.push_back(event);
            events.len()
        };
        self.inner.ready.notify_one();
        len
    }

    /// Waits until an event is queued and takes the oldest one.
    pub async fn wait(&self) -> WatchEvent {
        loop {
            let notified = self.inner.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.try_pop() {
                return event;
            }
            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<WatchEvent> {
        let mut events = self.inner.events.lock();
        let event = events.pop_front();
        if event.is_some() && !events.is_empty() {
            // Pass the baton on for the events still queued
            self.inner.ready.notify_one();
        }
        event
    }

    pub fn len(&self) -> usize {
        self.inner.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles refer to the same queue.
    pub fn same_queue(
        &self,
        other: &WatchQueue,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for WatchQueue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WatchQueue").field("len", &self.len()).finish()
    }
}
