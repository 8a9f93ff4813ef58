//! In-flight request bookkeeping
//!
//! Every RPC follows the same protocol against the [`RequestTable`]:
//! allocate an id, send the request tagged with it, wait for the reply the
//! dispatcher delivers for that id, consume it, release the id.

mod table;
pub use table::*;
