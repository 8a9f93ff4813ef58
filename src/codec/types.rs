use std::fmt;

use crate::ProtocolError;

/// Message types understood by the store daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Debug = 0,
    Directory = 1,
    Read = 2,
    GetPerms = 3,
    Watch = 4,
    Unwatch = 5,
    TransactionStart = 6,
    TransactionEnd = 7,
    Introduce = 8,
    Release = 9,
    GetDomainPath = 10,
    Write = 11,
    Mkdir = 12,
    Rm = 13,
    SetPerms = 14,
    WatchEvent = 15,
    Error = 16,
    IsDomainIntroduced = 17,
    Resume = 18,
    SetTarget = 19,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Debug => "DEBUG",
            MessageType::Directory => "DIRECTORY",
            MessageType::Read => "READ",
            MessageType::GetPerms => "GET_PERMS",
            MessageType::Watch => "WATCH",
            MessageType::Unwatch => "UNWATCH",
            MessageType::TransactionStart => "TRANSACTION_START",
            MessageType::TransactionEnd => "TRANSACTION_END",
            MessageType::Introduce => "INTRODUCE",
            MessageType::Release => "RELEASE",
            MessageType::GetDomainPath => "GET_DOMAIN_PATH",
            MessageType::Write => "WRITE",
            MessageType::Mkdir => "MKDIR",
            MessageType::Rm => "RM",
            MessageType::SetPerms => "SET_PERMS",
            MessageType::WatchEvent => "WATCH_EVENT",
            MessageType::Error => "ERROR",
            MessageType::IsDomainIntroduced => "IS_DOMAIN_INTRODUCED",
            MessageType::Resume => "RESUME",
            MessageType::SetTarget => "SET_TARGET",
        }
    }
}

impl TryFrom<u32> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, ProtocolError> {
        let t = match value {
            0 => MessageType::Debug,
            1 => MessageType::Directory,
            2 => MessageType::Read,
            3 => MessageType::GetPerms,
            4 => MessageType::Watch,
            5 => MessageType::Unwatch,
            6 => MessageType::TransactionStart,
            7 => MessageType::TransactionEnd,
            8 => MessageType::Introduce,
            9 => MessageType::Release,
            10 => MessageType::GetDomainPath,
            11 => MessageType::Write,
            12 => MessageType::Mkdir,
            13 => MessageType::Rm,
            14 => MessageType::SetPerms,
            15 => MessageType::WatchEvent,
            16 => MessageType::Error,
            17 => MessageType::IsDomainIntroduced,
            18 => MessageType::Resume,
            19 => MessageType::SetTarget,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        };
        Ok(t)
    }
}

impl fmt::Display for MessageType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-assigned transaction id threaded through every call of a
/// transaction. [`TransactionId::NIL`] means "no transaction".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransactionId(pub u32);

impl TransactionId {
    pub const NIL: TransactionId = TransactionId(0);

    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
