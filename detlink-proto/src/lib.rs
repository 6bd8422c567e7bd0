//! Framing codec and session data model for the GB/T 43229-2023 detector
//! link: CRC-16, byte-stuffed frame codec, stream reframer, and the wire
//! data model (device identifiers, operation codes, object identifiers).
//!
//! This crate has no knowledge of sockets or event loops; `detlink-server`
//! and `detlink-client` build the readiness-driven session layer on top of
//! it.

pub mod codec;
pub mod crc;
pub mod error;
pub mod ident;
pub mod ops;
pub mod reframe;
pub mod table;

pub use codec::{decode, encode, encode_to_vec, DELIMITER, ESCAPE, MAX_ENCODED_LEN};
pub use error::{BufferTooSmall, DecodeError, ErrorCode, TransportError};
pub use ident::{AdminCode, DeviceId, DeviceType};
pub use ops::{ObjectId, Operation};
pub use reframe::{find_frame, FrameSearch, ReceiveBuffer, MAX_FRAME_SIZE};
pub use table::{DataTable, HEADER_LEN, MAX_CONTENT_LEN, PROTOCOL_VERSION};
