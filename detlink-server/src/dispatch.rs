//! Dispatch table mapping decoded `(operation, object)` pairs to actions
//! (§4.D).

use slog::Logger;

use detlink_proto::{DataTable, DeviceId, ObjectId, Operation};

use crate::slot::Slot;

/// Applies a successfully decoded frame to `slot` and returns the reply to
/// send back, if the dispatch table calls for one. Every inbound frame has
/// already refreshed `slot.last_heartbeat` by the time this runs.
pub fn handle(slot: &mut Slot, own_identity: DeviceId, table: DataTable, log: &Logger) -> Option<DataTable> {
    match (table.operation, table.object) {
        (Operation::SetRequest, ObjectId::Communication) => {
            slog::info!(log, "session identified";
                "peer" => %slot.peer_addr, "sender" => ?table.sender);
            slot.identified = Some(table.sender);
            Some(DataTable::new(
                own_identity,
                table.sender,
                Operation::SetResponse,
                ObjectId::Communication,
                Vec::new(),
            ))
        }
        (Operation::QueryResponse, ObjectId::Communication) => {
            // Heartbeat reply; last_heartbeat is already current.
            None
        }
        (Operation::Upload, ObjectId::TrafficRealtime) => None,
        (Operation::Upload, ObjectId::TrafficStats) => Some(DataTable::new(
            own_identity,
            reply_receiver(slot, table.sender),
            Operation::UploadResponse,
            ObjectId::TrafficStats,
            Vec::new(),
        )),
        (Operation::Upload, ObjectId::DetectorStatus) => Some(DataTable::new(
            own_identity,
            reply_receiver(slot, table.sender),
            Operation::UploadResponse,
            ObjectId::DetectorStatus,
            Vec::new(),
        )),
        (operation, object) => {
            slog::debug!(log, "unhandled operation/object combination, ignoring";
                "peer" => %slot.peer_addr, "operation" => ?operation, "object" => ?object);
            None
        }
    }
}

/// The receiver identifier for a reply: the frame's own sender if the slot
/// has not finished identifying yet (shouldn't normally happen for uploads,
/// but avoids addressing a reply to nobody).
fn reply_receiver(slot: &Slot, fallback: DeviceId) -> DeviceId {
    slot.identified.unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use detlink_proto::DeviceType;
    use std::net::TcpListener as StdTcpListener;
    use std::time::Instant;

    fn controller_identity() -> DeviceId {
        DeviceId::new(0x123456u32, DeviceType::SIGNAL_CONTROLLER, 1)
    }

    fn dummy_log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn loopback_slot() -> Slot {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        drop(client);
        Slot::accept(
            mio::net::TcpStream::from_stream(accepted).unwrap(),
            "127.0.0.1:1".into(),
            Instant::now(),
        )
    }

    #[test]
    fn set_request_on_communication_identifies_the_slot_and_replies() {
        let mut slot = loopback_slot();

        let sender = DeviceId::new(1u32, DeviceType::COIL, 2);
        let table = DataTable::new(
            sender,
            controller_identity(),
            Operation::SetRequest,
            ObjectId::Communication,
            Vec::new(),
        );

        let reply = handle(&mut slot, controller_identity(), table, &dummy_log());
        assert_eq!(slot.identified, Some(sender));
        let reply = reply.expect("expected a set-response");
        assert_eq!(reply.operation, Operation::SetResponse);
        assert_eq!(reply.receiver, sender);
    }
}
