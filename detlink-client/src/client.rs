//! Single outbound session: connect, identify, upload, heartbeat, reconnect
//! (§4.E).

use std::io;
use std::io::Write;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Poll, PollOpt, Ready, Token};
use slog::Logger;

use detlink_proto::{decode, encode, DataTable, DeviceId, ObjectId, Operation, ReceiveBuffer, MAX_FRAME_SIZE};

use crate::payload::{self, TimeRecord};
use crate::source::MeasurementSource;
use crate::state::ClientState;

const TOKEN: Token = Token(0);

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const REALTIME_UPLOAD_INTERVAL: Duration = Duration::from_secs(2);
const STATISTICS_UPLOAD_INTERVAL: Duration = Duration::from_secs(60);
const HEARTBEAT_LAG_TIMEOUT: Duration = Duration::from_secs(15);
/// Readiness wait floor; also the cadence at which scheduled emissions and
/// the shutdown flag are checked (§5).
pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);
/// Idle sleep bounding CPU use while `Disconnected` and between polls (§4.E).
pub const IDLE_SLEEP: Duration = Duration::from_millis(100);

pub struct Detector {
    poll: Poll,
    events: Events,
    stream: Option<TcpStream>,
    state: ClientState,
    recv: ReceiveBuffer,
    /// Bytes a prior non-blocking write couldn't take, flushed on the next
    /// writable readiness event rather than spin-writing in place (§5).
    write_buf: Vec<u8>,
    server_addr: SocketAddr,
    own_identity: DeviceId,
    controller_identity: Option<DeviceId>,
    last_connect_attempt: Instant,
    last_heartbeat_seen: Instant,
    last_realtime_upload: Instant,
    last_statistics_upload: Instant,
    source: Box<dyn MeasurementSource>,
    log: Logger,
}

impl Detector {
    pub fn new(
        server_addr: SocketAddr,
        own_identity: DeviceId,
        source: Box<dyn MeasurementSource>,
        log: Logger,
    ) -> io::Result<Detector> {
        let now = Instant::now();
        Ok(Detector {
            poll: Poll::new()?,
            events: Events::with_capacity(16),
            stream: None,
            state: ClientState::Disconnected,
            recv: ReceiveBuffer::new(MAX_FRAME_SIZE),
            write_buf: Vec::new(),
            server_addr,
            own_identity,
            controller_identity: None,
            // Due in the past so the first tick attempts a connect right away.
            last_connect_attempt: now - CONNECT_RETRY_INTERVAL,
            last_heartbeat_seen: now,
            last_realtime_upload: now,
            last_statistics_upload: now,
            source,
            log,
        })
    }

    #[inline]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// One iteration of the client's cooperative loop. Returns promptly:
    /// callers sleep [`IDLE_SLEEP`] between calls while disconnected, or rely
    /// on the internal [`POLL_TIMEOUT`] wait while connected.
    pub fn tick(&mut self) {
        match self.state {
            ClientState::Disconnected => self.try_connect(),
            _ => self.service_connection(),
        }
    }

    fn try_connect(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_connect_attempt) < CONNECT_RETRY_INTERVAL {
            return;
        }
        self.last_connect_attempt = now;

        match TcpStream::connect(&self.server_addr) {
            Ok(stream) => {
                if let Err(err) = self.poll.register(
                    &stream,
                    TOKEN,
                    Ready::readable() | Ready::writable(),
                    PollOpt::edge(),
                ) {
                    slog::warn!(self.log, "failed to register connecting socket"; "error" => %err);
                    return;
                }
                slog::info!(self.log, "connecting"; "server" => %self.server_addr);
                self.stream = Some(stream);
                self.state = ClientState::Connecting;
                self.recv = ReceiveBuffer::new(MAX_FRAME_SIZE);
                self.write_buf.clear();
                self.last_heartbeat_seen = now;
            }
            Err(err) => {
                slog::debug!(self.log, "connect attempt failed, will retry"; "error" => %err);
            }
        }
    }

    fn service_connection(&mut self) {
        if let Err(err) = self.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
            slog::warn!(self.log, "poll failed"; "error" => %err);
            self.disconnect();
            return;
        }

        let events: Vec<Ready> = self.events.iter().map(|e| e.readiness()).collect();
        for readiness in events {
            if readiness.is_writable() {
                if self.state == ClientState::Connecting {
                    self.finish_connecting();
                } else {
                    self.flush_write_buf();
                }
            }
            if readiness.is_readable() && self.stream.is_some() {
                self.drain_socket();
            }
            if self.state == ClientState::Disconnected {
                return;
            }
        }

        let now = Instant::now();
        if now.duration_since(self.last_heartbeat_seen) >= HEARTBEAT_LAG_TIMEOUT {
            slog::warn!(self.log, "no frame from the controller within the heartbeat window, disconnecting");
            self.disconnect();
            return;
        }

        if self.state == ClientState::Ready {
            self.maybe_upload(now);
        }
    }

    fn finish_connecting(&mut self) {
        let connect_ok = match &self.stream {
            Some(stream) => matches!(stream.take_error(), Ok(None)),
            None => false,
        };

        if !connect_ok {
            slog::warn!(self.log, "connect failed");
            self.disconnect();
            return;
        }

        self.send(DataTable::new(
            self.own_identity,
            DeviceId::zero(),
            Operation::SetRequest,
            ObjectId::Communication,
            Vec::new(),
        ));
        self.state = ClientState::WaitingAck;
    }

    fn drain_socket(&mut self) {
        loop {
            let read_result = match &mut self.stream {
                Some(stream) => self.recv.ingress(stream),
                None => return,
            };
            if self.recv.was_reset() {
                slog::warn!(self.log, "receive buffer overflow, resetting");
            }

            match read_result {
                Ok(0) => {
                    slog::info!(self.log, "controller closed the connection");
                    self.disconnect();
                    return;
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    slog::warn!(self.log, "read failed"; "error" => %err);
                    self.disconnect();
                    return;
                }
            }

            if !self.process_buffered_frames() {
                return;
            }
        }

        self.process_buffered_frames();
    }

    /// Returns false if processing caused a disconnect, so the caller stops.
    fn process_buffered_frames(&mut self) -> bool {
        loop {
            let Some(raw) = self.recv.extract_frame() else { return true };

            match decode(&raw) {
                Ok(table) => self.route_inbound(table),
                Err(err) => {
                    slog::warn!(self.log, "frame decode failed, disconnecting"; "error" => %err);
                    self.disconnect();
                    return false;
                }
            }

            if self.state == ClientState::Disconnected {
                return false;
            }
        }
    }

    fn route_inbound(&mut self, table: DataTable) {
        self.last_heartbeat_seen = Instant::now();
        self.controller_identity.get_or_insert(table.sender);

        match (table.operation, table.object) {
            (Operation::SetResponse, ObjectId::Communication) => {
                slog::info!(self.log, "identified with the controller");
                self.state = ClientState::Ready;
            }
            (Operation::QueryRequest, ObjectId::Communication) => {
                self.send(DataTable::new(
                    self.own_identity,
                    table.sender,
                    Operation::QueryResponse,
                    ObjectId::Communication,
                    Vec::new(),
                ));
            }
            (Operation::UploadResponse, object) => {
                slog::debug!(self.log, "upload acknowledged"; "object" => ?object);
            }
            (operation, object) => {
                slog::debug!(self.log, "ignoring unexpected frame"; "operation" => ?operation, "object" => ?object);
            }
        }
    }

    fn maybe_upload(&mut self, now: Instant) {
        if now.duration_since(self.last_realtime_upload) >= REALTIME_UPLOAD_INTERVAL {
            let channels = self.source.next_snapshot();
            let content = payload::encode_realtime(TimeRecord::now(), &channels);
            self.send(DataTable::new(
                self.own_identity,
                self.controller_identity.unwrap_or_else(DeviceId::zero),
                Operation::Upload,
                ObjectId::TrafficRealtime,
                content,
            ));
            self.last_realtime_upload = now;
        }

        if now.duration_since(self.last_statistics_upload) >= STATISTICS_UPLOAD_INTERVAL {
            let channels = self.source.next_snapshot();
            let content = payload::encode_stats(TimeRecord::now(), &channels);
            self.send(DataTable::new(
                self.own_identity,
                self.controller_identity.unwrap_or_else(DeviceId::zero),
                Operation::Upload,
                ObjectId::TrafficStats,
                content,
            ));
            self.last_statistics_upload = now;
        }
    }

    fn send(&mut self, table: DataTable) {
        let mut buf = Vec::new();
        if encode(&table, &mut buf).is_err() {
            slog::warn!(self.log, "encode failed for outbound frame");
            return;
        }
        self.enqueue(buf);
    }

    /// Writes as much of `bytes` as the socket accepts right now; anything
    /// it can't take is queued in `write_buf` and flushed on the next
    /// writable readiness event rather than spinning on `WouldBlock` (§5).
    fn enqueue(&mut self, bytes: Vec<u8>) {
        if !self.write_buf.is_empty() {
            self.write_buf.extend_from_slice(&bytes);
            return;
        }

        let result = match &mut self.stream {
            Some(stream) => write_partial(stream, &bytes),
            None => return,
        };

        match result {
            Ok(written) if written < bytes.len() => {
                self.write_buf.extend_from_slice(&bytes[written..]);
            }
            Ok(_) => {}
            Err(err) => {
                slog::warn!(self.log, "write failed, disconnecting"; "error" => %err);
                self.disconnect();
            }
        }
    }

    /// Drains the pending `write_buf` on writable readiness.
    fn flush_write_buf(&mut self) {
        if self.write_buf.is_empty() {
            return;
        }

        let result = match &mut self.stream {
            Some(stream) => write_partial(stream, &self.write_buf),
            None => return,
        };

        match result {
            Ok(written) => {
                self.write_buf.drain(0..written);
            }
            Err(err) => {
                slog::warn!(self.log, "write failed, disconnecting"; "error" => %err);
                self.disconnect();
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = self.poll.deregister(&stream);
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.write_buf.clear();
        self.controller_identity = None;
        self.state = ClientState::Disconnected;
    }
}

/// Writes as much of `buf` as the non-blocking socket accepts right now,
/// stopping (not spinning) on `WouldBlock`. Returns the number of bytes
/// actually written, which may be less than `buf.len()`.
fn write_partial(stream: &mut TcpStream, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        match stream.write(&buf[written..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => return Err(err),
        }
    }
    Ok(written)
}
