//! Client API over the xenstore rings
//!
//! - [`Xenbus`] - Subsystem handle: lifecycle plus every store operation
//! - [`TransactionCoordinator`] - Runs a unit of work in a transaction and
//!   retries it when the commit conflicts
//! - [`XenbusState`] - Device state machine shared with backends
//!
//! # Basic Usage
//! ```ignore
//! let bus = Xenbus::start(page, channel, XenbusConfig::new()?.validate()?).await?;
//!
//! bus.write(TransactionId::NIL, "device/vif/0/mac", b"00:16:3e:00:00:01").await?;
//! let backend = bus.read_string(TransactionId::NIL, "device/vif/0/backend").await?;
//!
//! bus.watch(&backend, "vif-0", None).await?;
//! let event = bus.wait_for_watch(None).await;
//!
//! bus.transactions()
//!     .run(|txn| {
//!         let bus = bus.clone();
//!         async move { bus.write(txn, "data/counter", b"1").await }
//!     })
//!     .await?;
//!
//! bus.shutdown().await;
//! ```

mod permission;
mod state;
mod store;
mod transaction;
mod watch;
mod xenbus;

pub use permission::*;
pub use state::*;
pub use transaction::*;
pub use xenbus::*;
