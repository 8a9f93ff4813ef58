//! Frame layout for messages carried on the byte rings
//!
//! A frame is a fixed 16 byte header followed by `len` payload bytes, with no
//! padding and no alignment requirement:
//!
//! ```text
//! +--------+--------+--------+--------+----------------+
//! |  type  | req_id | tx_id  |  len   | payload (len)  |
//! +--------+--------+--------+--------+----------------+
//!   u32 LE   u32 LE   u32 LE   u32 LE
//! ```
//!
//! Payloads are opaque bytes; most requests carry NUL-terminated strings.

mod types;
pub use types::*;


use crate::constants::HEADER_SIZE;
use crate::constants::RING_SIZE;
use crate::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub msg_type: MessageType,
    pub req_id: u32,
    pub tx_id: TransactionId,
    pub len: u32,
}

impl MessageHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&(self.msg_type as u32).to_le_bytes());
        out[4..8].copy_from_slice(&self.req_id.to_le_bytes());
        out[8..12].copy_from_slice(&self.tx_id.0.to_le_bytes());
        out[12..16].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self, ProtocolError> {
        let (msg_type, req_id, tx_id, len) = raw_fields(bytes);
        Ok(Self {
            msg_type: MessageType::try_from(msg_type)?,
            req_id,
            tx_id: TransactionId(tx_id),
            len,
        })
    }
}

/// Declared payload length of a header that has not been validated yet.
pub(crate) fn declared_len(bytes: &[u8; HEADER_SIZE]) -> u32 {
    raw_fields(bytes).3
}

fn raw_fields(bytes: &[u8; HEADER_SIZE]) -> (u32, u32, u32, u32) {
    let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    (word(0), word(4), word(8), word(12))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(
        msg_type: MessageType,
        req_id: u32,
        tx_id: TransactionId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            header: MessageHeader {
                msg_type,
                req_id,
                tx_id,
                len: payload.len() as u32,
            },
            payload,
        }
    }

    /// Builds a message whose payload is the concatenation of `segments`.
    pub fn from_segments(
        msg_type: MessageType,
        req_id: u32,
        tx_id: TransactionId,
        segments: &[&[u8]],
    ) -> Self {
        let payload = segments.iter().flat_map(|s| s.iter().copied()).collect();
        Self::new(msg_type, req_id, tx_id, payload)
    }

    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }

    pub fn req_id(&self) -> u32 {
        self.header.req_id
    }

    /// Total bytes this message occupies on a ring.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Header then payload. A frame that cannot fit in a ring is refused.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.frame_len();
        if len > RING_SIZE {
            return Err(ProtocolError::FrameTooLarge { len });
        }
        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let header_bytes: &[u8; HEADER_SIZE] = frame
            .get(..HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| ProtocolError::MalformedPayload(format!("short frame of {} bytes", frame.len())))?;
        let header = MessageHeader::decode(header_bytes)?;
        let payload = &frame[HEADER_SIZE..];
        if payload.len() != header.len as usize {
            return Err(ProtocolError::MalformedPayload(format!(
                "header declares {} payload bytes, frame holds {}",
                header.len,
                payload.len()
            )));
        }
        Ok(Self {
            header,
            payload: payload.to_vec(),
        })
    }

    /// Error code carried by an `ERROR` reply.
    pub fn error_code(&self) -> Result<&str, ProtocolError> {
        match self.payload.split_last() {
            Some((0, code)) => std::str::from_utf8(code)
                .map_err(|e| ProtocolError::MalformedPayload(format!("error code is not ASCII: {e}"))),
            _ => Err(ProtocolError::MissingNul),
        }
    }

    /// Splits a `WATCH_EVENT` payload `path\0token\0` into its two strings.
    pub fn watch_event_parts(&self) -> Result<(String, String), ProtocolError> {
        let mut parts = split_nul_terminated(&self.payload)?.into_iter();
        match (parts.next(), parts.next()) {
            (Some(path), Some(token)) => Ok((path, token)),
            _ => Err(ProtocolError::MalformedPayload(
                "watch event needs a path and a token".to_string(),
            )),
        }
    }
}

/// Splits a payload of NUL-terminated entries. Bytes after the last NUL are
/// not an entry and are ignored.
pub fn split_nul_terminated(payload: &[u8]) -> Result<Vec<String>, ProtocolError> {
    let end = match payload.iter().rposition(|b| *b == 0) {
        Some(pos) => pos,
        None => return Ok(Vec::new()),
    };
    payload[..end]
        .split(|b| *b == 0)
        .map(|entry| {
            String::from_utf8(entry.to_vec())
                .map_err(|e| ProtocolError::MalformedPayload(format!("entry is not UTF-8: {e}")))
        })
        .collect()
}

/// Returns `s` followed by a NUL byte.
pub(crate) fn nul_terminated(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 1);
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out
}
