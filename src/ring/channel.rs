use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;

use crate::Error;
use crate::Result;

/// Callback run when the peer signals the event channel. It must only wake
/// waiters; it never touches the rings itself.
pub type NotificationHandler = Box<dyn Fn() + Send + Sync + 'static>;

/// The single notification channel shared with the store daemon.
#[cfg_attr(test, automock)]
pub trait EventChannel: Send + Sync + 'static {
    /// Fires one outbound notification.
    ///
    /// # Errors
    /// [`Error::Fatal`] when the channel can no longer deliver notifications.
    fn notify(&self) -> Result<()>;

    /// Installs the inbound notification handler, replacing any previous one.
    fn bind(
        &self,
        handler: NotificationHandler,
    ) -> Result<()>;
}

#[derive(Default)]
struct Endpoint {
    handler: RwLock<Option<NotificationHandler>>,
    /// A notification arrived before any handler was bound
    pending: AtomicBool,
}

impl Endpoint {
    fn raise(&self) {
        match self.handler.read().as_ref() {
            Some(handler) => handler(),
            None => self.pending.store(true, Ordering::Release),
        }
    }
}

/// In-process event channel. [`LoopbackChannel::pair`] returns two connected
/// ends; `notify` on one runs the handler bound on the other.
pub struct LoopbackChannel {
    local: Arc<Endpoint>,
    remote: Arc<Endpoint>,
    closed: Arc<AtomicBool>,
}

impl LoopbackChannel {
    pub fn pair() -> (Arc<LoopbackChannel>, Arc<LoopbackChannel>) {
        let a = Arc::new(Endpoint::default());
        let b = Arc::new(Endpoint::default());
        let closed = Arc::new(AtomicBool::new(false));
        (
            Arc::new(LoopbackChannel {
                local: a.clone(),
                remote: b.clone(),
                closed: closed.clone(),
            }),
            Arc::new(LoopbackChannel {
                local: b,
                remote: a,
                closed,
            }),
        )
    }

    /// Tears the channel down for both ends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl EventChannel for LoopbackChannel {
    fn notify(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Fatal("event channel closed".to_string()));
        }
        self.remote.raise();
        Ok(())
    }

    fn bind(
        &self,
        handler: NotificationHandler,
    ) -> Result<()> {
        *self.local.handler.write() = Some(handler);
        if self.local.pending.swap(false, Ordering::AcqRel) {
            self.local.raise();
        }
        Ok(())
    }
}
