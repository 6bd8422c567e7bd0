//! One entry in the server's fixed-size table of client sessions (§3, §9).

use std::time::Instant;

use mio::net::TcpStream;

use detlink_proto::{DeviceId, ReceiveBuffer, MAX_FRAME_SIZE};

/// A live client session: an accepted connection, its receive buffer, and
/// the peer identity learned from its first `SET-request`.
///
/// Invariant: a slot is either absent from the table (free) or present with
/// a valid stream and buffer (live); there is no half-initialized state.
pub struct Slot {
    pub stream: TcpStream,
    pub peer_addr: String,
    pub identified: Option<DeviceId>,
    pub last_heartbeat: Instant,
    pub recv: ReceiveBuffer,
    /// Bytes queued for this slot that a prior non-blocking write couldn't
    /// take; flushed on the next writable readiness event rather than
    /// spin-writing in place (§5: "never blocks on slow peers").
    pub write_buf: Vec<u8>,
}

impl Slot {
    pub fn accept(stream: TcpStream, peer_addr: String, now: Instant) -> Slot {
        Slot {
            stream,
            peer_addr,
            identified: None,
            last_heartbeat: now,
            recv: ReceiveBuffer::new(MAX_FRAME_SIZE),
            write_buf: Vec::new(),
        }
    }

    #[inline]
    pub fn is_identified(&self) -> bool {
        self.identified.is_some()
    }

    #[inline]
    pub fn touch_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = now;
    }
}
