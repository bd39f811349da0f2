// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The message bus.
//!
//! The bus owns a bounded set of pipes (each a bounded OS queue) and a
//! table mapping each packet id to the pipes subscribed to it. Sending a
//! message copies its bytes to every subscriber's pipe in registration
//! order; receiving pulls whole messages from one pipe. Producers and
//! consumers never share buffers.
//!
//! Pipes and subscriptions are created during initialization, before the
//! scheduler starts; after that the tables are effectively read-only and
//! the bus is freely shared across tasks. A subscriber that falls behind
//! back-pressures only itself: its pipe fills and sends to it time out,
//! while delivery to the remaining subscribers continues.
//!
//! The bus reports exactly one kind of diagnostic through the event
//! pipeline, for messages too malformed to route. Per-subscriber
//! delivery failures are recorded in counters only: the event pipeline
//! itself publishes through this bus, and a bus that raised an event for
//! every failed delivery could amplify a fault instead of reporting it.

use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use abi::{
    EventSink, MbStatus, ModuleId, MsgHeader, PipeId,
    EVENT_ID_MALFORMED_PACKET, MAX_NUM_PIPES, MAX_PIPES_PER_PACKET,
    NUM_PACKET_IDS,
};
use osal::queue::Queue;
use osal::{OsError, Timeout};
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::FromBytes;

/// Errors reported by bus operations. Discriminants are stable because
/// they can appear in telemetry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum MbError {
    /// No pipe slots remain, or a packet's subscription list is full.
    MaxPipesReached = 3,
    /// The OS failed to create the pipe's queue.
    PipeCreateFailed = 4,
    /// A message or buffer did not satisfy the operation's contract.
    InvalidArguments = 5,
    /// The OS reported a non-timeout failure reading a pipe.
    PipeReadError = 6,
    /// The pipe id does not name an allocated pipe.
    InvalidPipe = 7,
    /// A blocking operation ran out its timeout.
    Timeout = 8,
    /// The OS reported a non-timeout failure delivering to at least one
    /// subscriber.
    SendError = 9,
    /// The packet id was the invalid sentinel.
    InvalidPacketId = 10,
}

type SubscriberList = heapless::Vec<PipeId, MAX_PIPES_PER_PACKET>;

/// The message bus. One per system, shared behind `Arc`.
pub struct MessageBus {
    pipes: Mutex<Vec<Arc<Queue>>>,
    subscriptions: Mutex<[SubscriberList; NUM_PACKET_IDS]>,
    sink: OnceLock<Arc<dyn EventSink>>,

    messages_sent: AtomicU32,
    send_errors: AtomicU32,
    messages_received: AtomicU32,
    receive_errors: AtomicU32,
    last_send_packet: AtomicU16,
    last_send_pipe: AtomicU16,
    last_send_error: AtomicU16,
    last_receive_pipe: AtomicU16,
    last_receive_error: AtomicU16,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    /// Creates an empty bus: no pipes, no subscriptions, zeroed
    /// counters.
    pub fn new() -> Self {
        MessageBus {
            pipes: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Default::default()),
            sink: OnceLock::new(),
            messages_sent: AtomicU32::new(0),
            send_errors: AtomicU32::new(0),
            messages_received: AtomicU32::new(0),
            receive_errors: AtomicU32::new(0),
            last_send_packet: AtomicU16::new(0),
            last_send_pipe: AtomicU16::new(0),
            last_send_error: AtomicU16::new(0),
            last_receive_pipe: AtomicU16::new(0),
            last_receive_error: AtomicU16::new(0),
        }
    }

    /// Installs the diagnostic sink. The first installation wins; the
    /// bootstrap wires the event module in here once both exist.
    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        let _ = self.sink.set(sink);
    }

    /// Allocates the next pipe index, backed by a queue of `depth`
    /// messages of up to `max_msg_size` bytes. On failure the pipe
    /// count is unchanged.
    pub fn create_pipe(
        &self,
        depth: usize,
        max_msg_size: usize,
    ) -> Result<PipeId, MbError> {
        let mut pipes = lock(&self.pipes);
        if pipes.len() >= MAX_NUM_PIPES {
            return Err(MbError::MaxPipesReached);
        }
        let queue = Queue::new(depth, max_msg_size)
            .map_err(|_| MbError::PipeCreateFailed)?;
        let id = PipeId(pipes.len() as u16);
        pipes.push(Arc::new(queue));
        Ok(id)
    }

    /// Number of pipes allocated so far.
    pub fn num_pipes(&self) -> usize {
        lock(&self.pipes).len()
    }

    /// Subscribes `pipe` to `packet_id`. Subscriptions are not
    /// deduplicated: registering the same pair twice delivers every
    /// matching message twice.
    pub fn register_packet(
        &self,
        pipe: PipeId,
        packet_id: abi::PacketId,
    ) -> Result<(), MbError> {
        if packet_id == abi::PacketId::Invalid {
            return Err(MbError::InvalidPacketId);
        }
        if pipe.index() >= lock(&self.pipes).len() {
            return Err(MbError::InvalidPipe);
        }
        let mut subscriptions = lock(&self.subscriptions);
        subscriptions[packet_id as usize]
            .push(pipe)
            .map_err(|_| MbError::MaxPipesReached)
    }

    /// Sends one message to every subscriber of its packet id.
    ///
    /// `frame` must begin with a stamped header; the bytes delivered are
    /// the header plus the payload length it declares. Delivery is
    /// sequential in registration order and continues past failing
    /// subscribers. The aggregate result is `Ok` only if every delivery
    /// succeeded; otherwise a non-timeout failure reports `SendError`
    /// even if some other subscriber also timed out.
    pub fn send(
        &self,
        frame: &[u8],
        timeout: Timeout,
    ) -> Result<(), MbError> {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);

        let header = match MsgHeader::read_from_prefix(frame) {
            Ok((header, _rest)) => header,
            Err(_) => return self.malformed(line!()),
        };
        let size = header.frame_size();
        if frame.len() < size {
            return self.malformed(line!());
        }
        let packet_id = match header.packet_id() {
            Some(id) => id,
            None => return self.malformed(line!()),
        };

        // Snapshot the subscribers so a slow delivery doesn't hold the
        // tables.
        let subscribers: Vec<(PipeId, Arc<Queue>)> = {
            let pipes = lock(&self.pipes);
            lock(&self.subscriptions)[packet_id as usize]
                .iter()
                .map(|&pipe| (pipe, Arc::clone(&pipes[pipe.index()])))
                .collect()
        };

        let mut result = Ok(());
        for (pipe, queue) in subscribers {
            match queue.send(&frame[..size], timeout) {
                Ok(()) => {}
                Err(OsError::Timeout) => {
                    if result != Err(MbError::SendError) {
                        result = Err(MbError::Timeout);
                    }
                }
                Err(error) => {
                    result = Err(MbError::SendError);
                    self.send_errors.fetch_add(1, Ordering::Relaxed);
                    self.last_send_packet
                        .store(packet_id as u16, Ordering::Relaxed);
                    self.last_send_pipe.store(pipe.0, Ordering::Relaxed);
                    self.last_send_error
                        .store(error.code() as u16, Ordering::Relaxed);
                }
            }
        }
        result
    }

    /// Receives the oldest message from `pipe` into `buffer`, returning
    /// its length. `buffer` must hold the pipe's maximum message size;
    /// messages are never delivered partially.
    pub fn receive(
        &self,
        pipe: PipeId,
        buffer: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize, MbError> {
        let queue = lock(&self.pipes)
            .get(pipe.index())
            .cloned()
            .ok_or(MbError::InvalidArguments)?;
        match queue.receive(buffer, timeout) {
            Ok(length) => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
                Ok(length)
            }
            Err(OsError::Timeout) => Err(MbError::Timeout),
            Err(OsError::InvalidArguments) => Err(MbError::InvalidArguments),
            Err(error) => {
                self.receive_errors.fetch_add(1, Ordering::Relaxed);
                self.last_receive_pipe.store(pipe.0, Ordering::Relaxed);
                self.last_receive_error
                    .store(error.code() as u16, Ordering::Relaxed);
                Err(MbError::PipeReadError)
            }
        }
    }

    /// Snapshots the bus counters.
    pub fn get_status(&self) -> MbStatus {
        MbStatus {
            messages_sent: U32::new(
                self.messages_sent.load(Ordering::Relaxed),
            ),
            send_errors: U32::new(self.send_errors.load(Ordering::Relaxed)),
            messages_received: U32::new(
                self.messages_received.load(Ordering::Relaxed),
            ),
            receive_errors: U32::new(
                self.receive_errors.load(Ordering::Relaxed),
            ),
            last_send_packet: U16::new(
                self.last_send_packet.load(Ordering::Relaxed),
            ),
            last_send_pipe: U16::new(
                self.last_send_pipe.load(Ordering::Relaxed),
            ),
            last_send_error: U16::new(
                self.last_send_error.load(Ordering::Relaxed),
            ),
            last_receive_pipe: U16::new(
                self.last_receive_pipe.load(Ordering::Relaxed),
            ),
            last_receive_error: U16::new(
                self.last_receive_error.load(Ordering::Relaxed),
            ),
        }
    }

    // A message too malformed to route: count it, raise the one
    // diagnostic the bus is allowed to raise, and reject.
    fn malformed(&self, line: u32) -> Result<(), MbError> {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = self.sink.get() {
            sink.event(
                ModuleId::Mb,
                EVENT_ID_MALFORMED_PACKET,
                line,
                [0; 5],
            );
        }
        Err(MbError::InvalidArguments)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // The bus never panics while holding its locks, so poisoning would
    // mean the process is already tearing down.
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
