use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use tracing::warn;

use crate::codec::Message;
use crate::constants::NR_REQS;
use crate::Error;
use crate::ProtocolError;
use crate::Result;

/// Wire request id, always below [`NR_REQS`].
pub type RequestId = u32;

struct Slot {
    in_use: bool,
    /// A reply was delivered for the current use of this id
    answered: bool,
    /// Caller gave up waiting; the dispatcher frees the id when the reply lands
    abandoned: bool,
    reply: Option<Message>,
    waiter: Arc<Notify>,
}

impl Slot {
    fn idle() -> Self {
        Self {
            in_use: false,
            answered: false,
            abandoned: false,
            reply: None,
            waiter: Arc::new(Notify::new()),
        }
    }
}

struct TableState {
    slots: Vec<Slot>,
    live: usize,
    /// Next id to try; allocation is round-robin from here
    probe: usize,
    /// Allocators currently parked on a full table
    parked: usize,
    /// Set once no more replies will be delivered
    closed: Option<String>,
}

impl TableState {
    fn claim_next(&mut self) -> Option<RequestId> {
        if self.live == NR_REQS {
            return None;
        }
        let id = (0..NR_REQS)
            .map(|step| (self.probe + step) % NR_REQS)
            .find(|id| !self.slots[*id].in_use)?;

        self.slots[id] = Slot {
            in_use: true,
            ..Slot::idle()
        };
        self.live += 1;
        self.probe = (id + 1) % NR_REQS;
        Some(id as RequestId)
    }

    /// Frees `id`. Returns true when a parked allocator should be woken.
    fn free(
        &mut self,
        id: usize,
    ) -> bool {
        self.slots[id] = Slot::idle();
        self.live -= 1;
        self.parked > 0
    }
}

/// Fixed table of [`NR_REQS`] request ids, each correlating one in-flight
/// request with its eventual reply.
///
/// All wakeups are targeted: a release wakes one parked allocator, a
/// delivery wakes the single caller waiting on that id.
pub struct RequestTable {
    state: Mutex<TableState>,
    slot_freed: Notify,
}

impl RequestTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                slots: (0..NR_REQS).map(|_| Slot::idle()).collect(),
                live: 0,
                probe: 0,
                parked: 0,
                closed: None,
            }),
            slot_freed: Notify::new(),
        }
    }

    /// Claims a free id, scanning round-robin from just after the last id
    /// handed out. Waits while all ids are in flight.
    ///
    /// # Errors
    /// [`Error::Fatal`] once the table is closed.
    pub async fn allocate(&self) -> Result<RequestId> {
        loop {
            let notified = self.slot_freed.notified();
            tokio::pin!(notified);
            // Register before looking so a release in between is not missed
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(reason) = &state.closed {
                    return Err(Error::Fatal(reason.clone()));
                }
                if let Some(id) = state.claim_next() {
                    return Ok(id);
                }
                state.parked += 1;
            }

            debug!("all {} request ids in flight; waiting", NR_REQS);
            notified.await;
            self.state.lock().parked -= 1;
        }
    }

    /// Returns `id` to the pool. The caller must have consumed the reply.
    pub fn release(
        &self,
        id: RequestId,
    ) {
        let Some(idx) = index(id) else {
            warn!(id, "release of out of range request id");
            return;
        };
        let wake = {
            let mut state = self.state.lock();
            if !state.slots[idx].in_use {
                warn!(id, "release of request id that is not in use");
                return;
            }
            state.free(idx)
        };
        if wake {
            self.slot_freed.notify_one();
        }
    }

    /// Hands `reply` to the caller waiting on `id`. Never waits.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidRequestId`] when `id` is outside the table
    /// - [`ProtocolError::NoPendingRequest`] when `id` is not in flight
    /// - [`ProtocolError::DuplicateReply`] when `id` was already answered
    pub fn deliver(
        &self,
        id: RequestId,
        reply: Message,
    ) -> std::result::Result<(), ProtocolError> {
        let idx = index(id).ok_or(ProtocolError::InvalidRequestId(id))?;
        let mut state = self.state.lock();
        let slot = &mut state.slots[idx];
        if !slot.in_use {
            return Err(ProtocolError::NoPendingRequest { request_id: id });
        }
        if slot.answered {
            return Err(ProtocolError::DuplicateReply { request_id: id });
        }

        if slot.abandoned {
            debug!(id, "late reply for abandoned request; freeing id");
            let wake = state.free(idx);
            drop(state);
            if wake {
                self.slot_freed.notify_one();
            }
            return Ok(());
        }

        slot.answered = true;
        slot.reply = Some(reply);
        let waiter = slot.waiter.clone();
        drop(state);
        waiter.notify_one();
        Ok(())
    }

    /// Waits for the reply to `id` and takes it. Does not release `id`.
    ///
    /// A reply delivered before the table closed is still handed out.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidRequestId`] when `id` is outside the table
    /// - [`Error::Fatal`] when the table closes while waiting
    pub async fn take_reply(
        &self,
        id: RequestId,
    ) -> Result<Message> {
        let idx = index(id).ok_or(ProtocolError::InvalidRequestId(id))?;
        loop {
            let waiter = {
                let mut state = self.state.lock();
                let TableState { slots, closed, .. } = &mut *state;
                let slot = &mut slots[idx];
                if let Some(reply) = slot.reply.take() {
                    return Ok(reply);
                }
                if let Some(reason) = closed {
                    return Err(Error::Fatal(reason.clone()));
                }
                slot.waiter.clone()
            };
            waiter.notified().await;
        }
    }

    /// Stops the table for good: every caller waiting in
    /// [`RequestTable::take_reply`] or [`RequestTable::allocate`] and every
    /// later call fails with [`Error::Fatal`] carrying `reason`. Only the
    /// first reason is kept.
    pub fn close(
        &self,
        reason: &str,
    ) {
        let waiters: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return;
            }
            state.closed = Some(reason.to_string());
            state
                .slots
                .iter()
                .filter(|slot| slot.in_use)
                .map(|slot| slot.waiter.clone())
                .collect()
        };
        warn!(reason, waiting = waiters.len(), "request table closed");

        for waiter in waiters {
            waiter.notify_one();
        }
        self.slot_freed.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    /// Gives up on `id` without waiting for its reply. The id stays reserved
    /// until the reply arrives so it is never matched to a later request.
    pub fn abandon(
        &self,
        id: RequestId,
    ) {
        let Some(idx) = index(id) else {
            return;
        };
        let wake = {
            let mut state = self.state.lock();
            let slot = &mut state.slots[idx];
            if !slot.in_use {
                return;
            }
            if slot.answered {
                state.free(idx)
            } else {
                slot.abandoned = true;
                false
            }
        };
        if wake {
            self.slot_freed.notify_one();
        }
    }

    /// Number of ids currently in flight.
    pub fn in_flight(&self) -> usize {
        self.state.lock().live
    }

    pub fn is_in_use(
        &self,
        id: RequestId,
    ) -> bool {
        index(id).map(|idx| self.state.lock().slots[idx].in_use).unwrap_or(false)
    }
}

impl Default for RequestTable {
    fn default() -> Self {
        Self::new()
    }
}

fn index(id: RequestId) -> Option<usize> {
    let idx = id as usize;
    (idx < NR_REQS).then_some(idx)
}
