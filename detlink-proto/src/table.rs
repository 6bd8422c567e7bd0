//! The Data Table: the application-layer payload, independent of framing (§3).

use crate::ident::DeviceId;
use crate::ops::{ObjectId, Operation};

/// Fixed protocol version byte carried in every data table.
pub const PROTOCOL_VERSION: u8 = 0x10;

/// Header size in bytes: link address (2) + sender (7) + receiver (7) +
/// version (1) + operation (1) + object (2).
pub const HEADER_LEN: usize = 20;

/// Maximum content length allowed by the wire protocol (§3, §7).
pub const MAX_CONTENT_LEN: usize = 1500;

/// The application payload carried inside a framed frame, already stripped of
/// byte-stuffing and CRC by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    pub sender: DeviceId,
    pub receiver: DeviceId,
    pub operation: Operation,
    pub object: ObjectId,
    pub content: Vec<u8>,
}

impl DataTable {
    /// Builds a data table. The link-address field is always `0x0000` on the
    /// wire and is not part of this in-memory type.
    pub fn new(
        sender: DeviceId,
        receiver: DeviceId,
        operation: Operation,
        object: ObjectId,
        content: Vec<u8>,
    ) -> Self {
        DataTable {
            sender,
            receiver,
            operation,
            object,
            content,
        }
    }
}
