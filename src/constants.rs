// -
// Shared page geometry

/// Size in bytes of each of the two byte rings in the shared page.
pub const RING_SIZE: usize = 1024;

/// Size of the fixed frame header: `{type, req_id, tx_id, len}` as four u32.
pub const HEADER_SIZE: usize = 16;

// -
// Request multiplexing

/// Number of request ids that may be in flight at once.
pub const NR_REQS: usize = 32;

// -
// Well-known paths

/// Relative path holding the guest's own domain id.
pub(crate) const DOMID_PATH: &str = "domid";

/// First segment of a DEBUG request payload.
pub(crate) const DEBUG_PRINT: &str = "print";
