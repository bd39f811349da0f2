// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The event message module.
//!
//! Modules report faults and notable conditions by raising events:
//! fixed-size structured records carrying the reporting module, an event
//! id, the source line, and five parameters. Events are published on the
//! message bus under `PacketId::Event` like any other packet, so ground
//! software receives them through an ordinary pipe subscription.
//!
//! The one hard rule on this path: raising an event never blocks, and a
//! failure to publish an event is counted, not reported through another
//! event. The diagnostic pipeline must not amplify the fault it is
//! reporting.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use abi::{EmStatus, EventRecord, EventSink, ModuleId};
use msgbus::MessageBus;
use osal::Timeout;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::IntoBytes;

/// Builds and publishes event records. One per system, shared behind
/// `Arc`.
pub struct EventMessenger {
    bus: Arc<MessageBus>,
    messages_received: AtomicU32,
    messages_sent: AtomicU32,
    message_errors: AtomicU32,
    invalid_messages_received: AtomicU32,
}

impl EventMessenger {
    /// Creates the event module with zeroed counters, publishing on
    /// `bus`.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        EventMessenger {
            bus,
            messages_received: AtomicU32::new(0),
            messages_sent: AtomicU32::new(0),
            message_errors: AtomicU32::new(0),
            invalid_messages_received: AtomicU32::new(0),
        }
    }

    /// Raises an event. Callers pass `line!()` for the line number.
    ///
    /// A record from `ModuleId::Invalid` is counted and dropped. The
    /// publish uses `NoWait`, so this never blocks; if the bus cannot
    /// take the record the error counter increments and the record is
    /// lost.
    pub fn event(
        &self,
        module: ModuleId,
        event_id: u16,
        line_number: u32,
        params: [u32; 5],
    ) {
        if module == ModuleId::Invalid {
            self.invalid_messages_received
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.messages_received.fetch_add(1, Ordering::Relaxed);

        let record = EventRecord::new(module, event_id, line_number, params);
        match self.bus.send(record.as_bytes(), Timeout::NoWait) {
            Ok(()) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                // Counted only. Raising an event about a failed event
                // would recurse into the same failure.
                self.message_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Snapshots the event module counters.
    pub fn get_status(&self) -> EmStatus {
        EmStatus {
            messages_received: U32::new(
                self.messages_received.load(Ordering::Relaxed),
            ),
            messages_sent: U32::new(
                self.messages_sent.load(Ordering::Relaxed),
            ),
            message_errors: U32::new(
                self.message_errors.load(Ordering::Relaxed),
            ),
            invalid_messages_received: U32::new(
                self.invalid_messages_received.load(Ordering::Relaxed),
            ),
        }
    }
}

impl EventSink for EventMessenger {
    fn event(
        &self,
        module: ModuleId,
        event_id: u16,
        line_number: u32,
        params: [u32; 5],
    ) {
        EventMessenger::event(self, module, event_id, line_number, params);
    }
}
