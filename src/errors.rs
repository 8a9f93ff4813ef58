//! Xenbus Client Error Hierarchy
//!
//! Errors are split by where they originate: malformed traffic on the ring
//! ([`ProtocolError`]), explicit error replies from the store daemon
//! ([`RemoteError`]), local configuration, and unrecoverable collaborator
//! failures.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed frames, bad cursors or unmatched replies
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Explicit error frame returned by the store daemon
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Optional bounded wait on a reply expired
    #[error("Request {request_id} got no reply within {duration:?}")]
    Timeout { request_id: u32, duration: Duration },

    /// Transaction kept conflicting past the retry policy
    #[error("Transaction still conflicting after {0} attempts")]
    RetriesExhausted(usize),

    /// Shared ring or event channel became unusable
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Encoded frame would not fit in the ring
    #[error("Frame of {len} bytes exceeds ring capacity")]
    FrameTooLarge { len: usize },

    /// Header declares a payload that can never fit in the ring
    #[error("Header declares impossible payload length {len}")]
    OversizedPayload { len: u32 },

    /// Peer moved cursors so that more bytes are pending than the ring holds
    #[error("Ring cursors out of range (produced: {produced}, consumed: {consumed})")]
    CursorOverrun { produced: u32, consumed: u32 },

    #[error("Unknown message type {0}")]
    UnknownMessageType(u32),

    /// Reply routed to a request id outside the table
    #[error("Request id {0} is out of range")]
    InvalidRequestId(u32),

    /// Reply for an id that has no in-flight request
    #[error("No pending request for id {request_id}")]
    NoPendingRequest { request_id: u32 },

    /// Second reply for an id that already holds one
    #[error("Duplicate reply for id {request_id}")]
    DuplicateReply { request_id: u32 },

    /// Reply type does not answer the request that was sent
    #[error("Expected {expected} reply, got {actual}")]
    UnexpectedReply { expected: &'static str, actual: &'static str },

    /// Error frame payload lacks its terminating NUL
    #[error("Error reply is not NUL terminated")]
    MissingNul,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Error codes carried by `XS_ERROR` replies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("No such node")]
    NotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Node already exists")]
    AlreadyExists,

    #[error("Invalid argument")]
    Invalid,

    #[error("Request too big")]
    TooBig,

    #[error("No space left in store")]
    NoSpace,

    #[error("Read-only store")]
    ReadOnlyFilesystem,

    #[error("Path too long")]
    NameTooLong,

    /// Transaction commit raced with another writer; redo the whole sequence
    #[error("Transaction conflict, retry required")]
    Conflict,

    #[error("Node is a directory")]
    IsDirectory,

    #[error("Directory not empty")]
    NotEmpty,

    #[error("Store busy")]
    Busy,

    #[error("Store out of memory")]
    OutOfMemory,

    #[error("Store I/O error")]
    Io,

    #[error("Operation not supported")]
    NotSupported,

    #[error("Domain already connected")]
    AlreadyConnected,

    #[error("Unknown store error {0}")]
    Unknown(String),
}

impl RemoteError {
    /// Maps a wire error code (without its NUL) to a named condition.
    pub fn from_code(code: &str) -> Self {
        match code {
            "ENOENT" => RemoteError::NotFound,
            "EACCES" | "EPERM" => RemoteError::PermissionDenied,
            "EEXIST" => RemoteError::AlreadyExists,
            "EINVAL" => RemoteError::Invalid,
            "E2BIG" => RemoteError::TooBig,
            "ENOSPC" => RemoteError::NoSpace,
            "EROFS" => RemoteError::ReadOnlyFilesystem,
            "ENAMETOOLONG" => RemoteError::NameTooLong,
            "EAGAIN" => RemoteError::Conflict,
            "EISDIR" => RemoteError::IsDirectory,
            "ENOTEMPTY" => RemoteError::NotEmpty,
            "EBUSY" => RemoteError::Busy,
            "ENOMEM" => RemoteError::OutOfMemory,
            "EIO" => RemoteError::Io,
            "ENOSYS" => RemoteError::NotSupported,
            "EISCONN" => RemoteError::AlreadyConnected,
            other => RemoteError::Unknown(other.to_string()),
        }
    }

    /// Wire code for this condition.
    pub fn code(&self) -> &str {
        match self {
            RemoteError::NotFound => "ENOENT",
            RemoteError::PermissionDenied => "EACCES",
            RemoteError::AlreadyExists => "EEXIST",
            RemoteError::Invalid => "EINVAL",
            RemoteError::TooBig => "E2BIG",
            RemoteError::NoSpace => "ENOSPC",
            RemoteError::ReadOnlyFilesystem => "EROFS",
            RemoteError::NameTooLong => "ENAMETOOLONG",
            RemoteError::Conflict => "EAGAIN",
            RemoteError::IsDirectory => "EISDIR",
            RemoteError::NotEmpty => "ENOTEMPTY",
            RemoteError::Busy => "EBUSY",
            RemoteError::OutOfMemory => "ENOMEM",
            RemoteError::Io => "EIO",
            RemoteError::NotSupported => "ENOSYS",
            RemoteError::AlreadyConnected => "EISCONN",
            RemoteError::Unknown(code) => code,
        }
    }
}

impl Error {
    /// True when the store asked for the enclosing transaction to be redone.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Remote(RemoteError::Conflict))
    }
}
