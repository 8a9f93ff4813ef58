//! Watch registrations and event delivery
//!
//! ```text
//! store daemon --WATCH_EVENT--> Dispatcher --deliver(path, token)--> WatchRegistry
//!                                                                       |
//!                                                  token -> WatchQueue  v
//!                                                      caller: queue.wait()
//! ```
//!
//! Delivery never waits: the dispatcher appends to the listener's queue and
//! wakes one waiter. Events for tokens with no registration are logged and
//! dropped.

mod queue;
mod registry;

pub use queue::*;
pub use registry::*;
