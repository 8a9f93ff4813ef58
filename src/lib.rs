//! Guest side of the xenstore protocol over the shared ring page.
//!
//! Requests and replies travel as framed messages on two byte rings in one
//! shared page, with a single event channel signalling both directions.
//! Up to [`constants::NR_REQS`] requests are in flight at once; a single
//! dispatcher task routes replies back to their callers by request id and
//! watch events to listeners by token.
//!
//! Start with [`Xenbus::start`].

pub mod codec;
pub mod constants;

mod client;
mod config;
mod dispatcher;
mod errors;
mod request;
mod ring;
mod watch;
pub(crate) mod utils;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use request::*;
pub use ring::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod errors_test;
