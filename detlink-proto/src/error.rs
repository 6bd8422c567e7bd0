//! Error taxonomy: one type per failure domain (see SPEC_FULL.md §4.H).
//!
//! `DecodeError` is never a reason to close a session on its own; `TransportError`
//! always is.

use std::io;

/// A frame failed to decode. Carries exactly the error codes the wire protocol
/// can report back to the peer (`ErrorCode`), plus codec-internal kinds that
/// never leave the process (`Incomplete`, `Escape`, `BufferTooSmall`).
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame does not start with the delimiter byte")]
    FrameStart,
    #[error("frame does not end with the delimiter byte")]
    FrameEnd,
    #[error("escaped byte sequence is malformed")]
    Escape,
    #[error("unstuffed frame is shorter than header + crc")]
    Incomplete,
    #[error("crc checksum mismatch")]
    Crc,
    #[error("reserved link address field was non-zero")]
    LinkAddr,
    #[error("unsupported protocol version byte")]
    ProtocolVersion,
    #[error("unrecognized operation code")]
    Operation,
    #[error("object identifier field is malformed")]
    Object,
    #[error("content length exceeds the 1500-byte maximum")]
    Content,
}

impl DecodeError {
    /// The wire `ErrorCode` a dispatcher should report for this failure, if any.
    /// `Incomplete` never reaches a dispatcher: the reframer withholds the frame
    /// until it has a full one.
    pub fn wire_code(self) -> Option<ErrorCode> {
        match self {
            DecodeError::FrameStart => Some(ErrorCode::FrameStart),
            DecodeError::FrameEnd => Some(ErrorCode::FrameEnd),
            DecodeError::Escape => Some(ErrorCode::FrameEnd),
            DecodeError::Incomplete => None,
            DecodeError::Crc => Some(ErrorCode::Crc),
            DecodeError::LinkAddr => Some(ErrorCode::LinkAddr),
            DecodeError::ProtocolVersion => Some(ErrorCode::ProtocolVersion),
            DecodeError::Operation => Some(ErrorCode::Operation),
            DecodeError::Object => Some(ErrorCode::Object),
            DecodeError::Content => Some(ErrorCode::Content),
        }
    }
}

/// `ErrorResponse` payload (§6): a single byte identifying what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    FrameStart = 1,
    FrameEnd = 2,
    Crc = 3,
    LinkAddr = 4,
    ProtocolVersion = 5,
    Operation = 6,
    Object = 7,
    Content = 128,
}

impl From<ErrorCode> for u8 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code as u8
    }
}

/// Caller-provided encode buffer was too small for the escaped frame.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("encode buffer too small: need at least {needed} bytes, have {available}")]
pub struct BufferTooSmall {
    pub needed: usize,
    pub available: usize,
}

/// A transport-level I/O outcome: distinguishes "nothing to do right now" from
/// a fatal condition that must close the connection. Mirrors the `Wait` /
/// `Fatal` split used throughout the surrounding session-management code.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("operation would block")]
    Wait,
    #[error("connection closed by peer")]
    Eof,
    #[error("transport I/O error: {0}")]
    Io(io::Error),
    #[error("invalid address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}

impl TransportError {
    /// True for conditions that mean "try again later", false for anything
    /// that should tear the session down.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Wait)
    }
}

impl From<io::Error> for TransportError {
    #[inline]
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => TransportError::Wait,
            _ => TransportError::Io(err),
        }
    }
}
