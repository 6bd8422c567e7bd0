//! Single-threaded, readiness-multiplexed session manager (§4.D).

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Poll, PollOpt, Ready, Token};
use slog::Logger;

use detlink_proto::{decode, encode, DataTable, DecodeError, DeviceId, DeviceType, ErrorCode, ObjectId, Operation};
use detlink_util::shutdown;

use crate::dispatch;
use crate::slot::Slot;

/// Hard cap on concurrently live sessions (§3).
pub const MAX_CLIENTS: usize = 64;
/// Cadence of the outbound heartbeat probe to identified sessions (§4.D).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// A session with no inbound bytes for this long is reaped (§4.D).
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);
/// Readiness wait floor; also the resolution of the heartbeat clock (§5, §9).
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

const LISTENER_TOKEN: Token = Token(0);

fn slot_token(index: usize) -> Token {
    Token(index + 1)
}

fn token_slot(token: Token) -> usize {
    token.0 - 1
}

pub struct Server {
    poll: Poll,
    listener: TcpListener,
    events: Events,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    own_identity: DeviceId,
    last_heartbeat_check: Instant,
    log: Logger,
}

impl Server {
    pub fn bind(addr: SocketAddr, own_identity: DeviceId, log: Logger) -> io::Result<Server> {
        let listener = TcpListener::bind(&addr)?;
        let poll = Poll::new()?;
        poll.register(&listener, LISTENER_TOKEN, Ready::readable(), PollOpt::edge())?;

        let mut slots = Vec::with_capacity(MAX_CLIENTS);
        slots.resize_with(MAX_CLIENTS, || None);
        let free = (0..MAX_CLIENTS).rev().collect();

        let now = Instant::now();
        Ok(Server {
            poll,
            listener,
            events: Events::with_capacity(1024),
            slots,
            free,
            own_identity,
            last_heartbeat_check: now,
            log,
        })
    }

    /// Runs the readiness loop until `running` is cleared (§4.I).
    pub fn run(&mut self, running: &Arc<AtomicBool>) -> io::Result<()> {
        while shutdown::is_running(running) {
            self.poll.poll(&mut self.events, Some(POLL_TIMEOUT))?;

            let events: Vec<(Token, Ready)> = self.events.iter().map(|e| (e.token(), e.readiness())).collect();
            for (token, readiness) in events {
                if token == LISTENER_TOKEN {
                    self.accept_loop();
                    continue;
                }

                let index = token_slot(token);
                // Flush queued bytes before reading more: a peer that is slow
                // to read can otherwise starve its own pending replies.
                if readiness.is_writable() {
                    self.flush_slot(index);
                }
                if readiness.is_readable() {
                    self.service_slot(index);
                }
            }

            let now = Instant::now();
            if now.duration_since(self.last_heartbeat_check) >= HEARTBEAT_INTERVAL {
                self.run_heartbeat(now);
                self.last_heartbeat_check = now;
            }
        }
        Ok(())
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.accept_one(stream, addr),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    slog::warn!(self.log, "accept failed"; "error" => %err);
                    break;
                }
            }
        }
    }

    fn accept_one(&mut self, stream: TcpStream, addr: SocketAddr) {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                slog::warn!(self.log, "rejecting connection: at capacity"; "peer" => %addr, "max_clients" => MAX_CLIENTS);
                let _ = stream.shutdown(std::net::Shutdown::Both);
                return;
            }
        };

        if let Err(err) = self.poll.register(
            &stream,
            slot_token(index),
            Ready::readable() | Ready::writable(),
            PollOpt::edge(),
        ) {
            slog::warn!(self.log, "failed to register accepted connection"; "peer" => %addr, "error" => %err);
            self.free.push(index);
            return;
        }

        slog::info!(self.log, "accepted connection"; "peer" => %addr, "slot" => index);
        self.slots[index] = Some(Slot::accept(stream, addr.to_string(), Instant::now()));
    }

    /// Reads off the socket until it would block, draining every complete
    /// frame after each read. Edge-triggered readiness only fires once per
    /// transition, so a single read per event would silently stop seeing
    /// further bytes buffered by the kernel.
    fn service_slot(&mut self, index: usize) {
        loop {
            let read_result = match &mut self.slots[index] {
                Some(slot) => {
                    let stream = &mut slot.stream;
                    let result = slot.recv.ingress(stream);
                    if slot.recv.was_reset() {
                        slog::warn!(self.log, "receive buffer overflow, resetting"; "slot" => index);
                    }
                    result
                }
                None => return,
            };

            match read_result {
                Ok(0) => {
                    self.disconnect(index, "peer closed the connection");
                    return;
                }
                Ok(_) => {
                    self.drain_frames(index);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.drain_frames(index);
                    return;
                }
                Err(err) => {
                    self.disconnect_with_error(index, err);
                    return;
                }
            }
        }
    }

    fn drain_frames(&mut self, index: usize) {
        loop {
            let frame = match &mut self.slots[index] {
                Some(slot) => slot.recv.extract_frame(),
                None => return,
            };
            let Some(raw) = frame else { return };

            let now = Instant::now();
            if let Some(slot) = &mut self.slots[index] {
                slot.touch_heartbeat(now);
            }

            match decode(&raw) {
                Ok(table) => {
                    let reply = {
                        let slot = self.slots[index].as_mut().expect("slot present during dispatch");
                        dispatch::handle(slot, self.own_identity, table, &self.log)
                    };
                    if let Some(reply) = reply {
                        self.send(index, &reply);
                    }
                }
                Err(err) => self.respond_decode_error(index, err),
            }
        }
    }

    fn respond_decode_error(&mut self, index: usize, err: DecodeError) {
        slog::warn!(self.log, "frame decode failed"; "slot" => index, "error" => %err);
        let Some(code) = err.wire_code() else { return };

        let receiver = self.slots[index]
            .as_ref()
            .and_then(|slot| slot.identified)
            .unwrap_or_else(DeviceId::zero);

        let reply = DataTable::new(
            self.own_identity,
            receiver,
            Operation::ErrorResponse,
            ObjectId::Communication,
            vec![u8::from(code)],
        );
        self.send(index, &reply);
    }

    fn send(&mut self, index: usize, table: &DataTable) {
        let mut buf = Vec::new();
        if encode(table, &mut buf).is_err() {
            slog::warn!(self.log, "encode failed for outbound frame"; "slot" => index);
            return;
        }
        self.enqueue(index, buf);
    }

    /// Queues `bytes` for `index`, writing as much as possible right away
    /// without blocking. Anything a non-blocking write can't take is kept in
    /// the slot's `write_buf` and flushed on the next writable readiness
    /// event instead of busy-looping on `WouldBlock` (§5).
    fn enqueue(&mut self, index: usize, bytes: Vec<u8>) {
        let result = match &mut self.slots[index] {
            Some(slot) => {
                if slot.write_buf.is_empty() {
                    write_partial(&mut slot.stream, &bytes).map(|written| {
                        if written < bytes.len() {
                            slot.write_buf.extend_from_slice(&bytes[written..]);
                        }
                    })
                } else {
                    slot.write_buf.extend_from_slice(&bytes);
                    Ok(())
                }
            }
            None => return,
        };

        if let Err(err) = result {
            self.disconnect_with_error(index, err);
        }
    }

    /// Drains a slot's pending `write_buf` on writable readiness.
    fn flush_slot(&mut self, index: usize) {
        let result = match &mut self.slots[index] {
            Some(slot) if !slot.write_buf.is_empty() => {
                write_partial(&mut slot.stream, &slot.write_buf).map(|written| {
                    slot.write_buf.drain(0..written);
                })
            }
            _ => Ok(()),
        };

        if let Err(err) = result {
            self.disconnect_with_error(index, err);
        }
    }

    fn run_heartbeat(&mut self, now: Instant) {
        let indices: Vec<usize> = (0..MAX_CLIENTS).filter(|&i| self.slots[i].is_some()).collect();

        for index in indices {
            let should_reap = {
                let slot = self.slots[index].as_ref().expect("slot present");
                now.duration_since(slot.last_heartbeat) >= HEARTBEAT_TIMEOUT
            };

            if should_reap {
                slog::warn!(self.log, "reaping slot: heartbeat timeout"; "slot" => index);
                self.disconnect(index, "heartbeat timeout");
                continue;
            }

            let identified = self.slots[index].as_ref().and_then(|slot| slot.identified);
            if let Some(peer) = identified {
                let probe = DataTable::new(
                    self.own_identity,
                    peer,
                    Operation::QueryRequest,
                    ObjectId::Communication,
                    Vec::new(),
                );
                self.send(index, &probe);
            }
        }
    }

    fn disconnect_with_error(&mut self, index: usize, err: io::Error) {
        slog::warn!(self.log, "session failure"; "slot" => index, "error" => %err);
        self.disconnect(index, "io error");
    }

    fn disconnect(&mut self, index: usize, reason: &str) {
        if let Some(slot) = self.slots[index].take() {
            let _ = self.poll.deregister(&slot.stream);
            let _ = slot.stream.shutdown(std::net::Shutdown::Both);
            slog::info!(self.log, "disconnected slot"; "slot" => index, "peer" => %slot.peer_addr, "reason" => reason);
        }
        self.free.push(index);
    }
}

/// Writes as much of `buf` as the non-blocking socket accepts right now,
/// stopping (not spinning) on `WouldBlock`. Returns the number of bytes
/// actually written, which may be less than `buf.len()`; the caller is
/// responsible for keeping the remainder for the next writable event.
fn write_partial(stream: &mut TcpStream, buf: &[u8]) -> io::Result<usize> {
    use std::io::Write;
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

/// Builds the controller's own device identifier, reported as `sender` on
/// every outbound frame.
pub fn own_identity(admin_code: detlink_proto::AdminCode, device_serial: u16) -> DeviceId {
    DeviceId::new(admin_code, DeviceType::SIGNAL_CONTROLLER, device_serial)
}
