// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The telemetry producer.
//!
//! A periodic task that samples every module's status counters, packs
//! them into a health-and-status packet, and publishes it on the bus.
//! The packet is rebuilt from zeroed storage each cycle, so stale
//! samples never leak between publications.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use abi::{
    HealthAndStatus, ModuleId, Priority, TaskId, TblStatus, TlmStatus,
};
use events::EventMessenger;
use msgbus::MessageBus;
use osal::Timeout;
use sched::TaskManager;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::IntoBytes;

/// Telemetry publishes at 1 Hz.
pub const TELEMETRY_PERIOD_SLOTS: u32 = sched::SLOTS_PER_SECOND;

/// A publication may slip one full period before the task is flagged.
pub const TELEMETRY_HEARTBEAT_SLOTS: u32 = 2 * TELEMETRY_PERIOD_SLOTS;

pub const TELEMETRY_PRIORITY: Priority = Priority(25);

/// Event raised when a health-and-status packet could not be sent.
/// Parameter 0 carries the bus error code.
pub const EVENT_ID_TELEMETRY_SEND_FAILURE: u16 = 1;

/// The telemetry producer. One per system, shared behind `Arc`.
pub struct Telemetry {
    bus: Arc<MessageBus>,
    events: Arc<EventMessenger>,
    manager: Arc<TaskManager>,
    telemetry_sent: AtomicU32,
    telemetry_errors: AtomicU32,
}

impl Telemetry {
    pub fn new(
        bus: Arc<MessageBus>,
        events: Arc<EventMessenger>,
        manager: Arc<TaskManager>,
    ) -> Arc<Self> {
        Arc::new(Telemetry {
            bus,
            events,
            manager,
            telemetry_sent: AtomicU32::new(0),
            telemetry_errors: AtomicU32::new(0),
        })
    }

    /// Registers the telemetry task with the task manager under `id`.
    pub fn attach(self: &Arc<Self>, id: TaskId) -> Result<(), sched::TmError> {
        let telemetry = Arc::clone(self);
        let manager = Arc::clone(&self.manager);
        self.manager.periodic_task(
            "telemetry",
            id,
            move || {
                while manager.running(id) {
                    telemetry.publish();
                }
            },
            TELEMETRY_PERIOD_SLOTS,
            TELEMETRY_HEARTBEAT_SLOTS,
            abi::DEFAULT_STACK_SIZE,
            TELEMETRY_PRIORITY,
        )
    }

    /// Samples every module's status and publishes one health-and-status
    /// packet. Publishing never blocks; on failure the local error
    /// counter increments and an event is raised (telemetry is an
    /// ordinary bus client, not part of the event path itself).
    pub fn publish(&self) {
        let packet = HealthAndStatus::new(
            self.get_status(),
            self.bus.get_status(),
            self.events.get_status(),
            // the table store is not part of this runtime; its slot
            // rides along zeroed
            TblStatus::default(),
            self.manager.get_status(),
        );

        match self.bus.send(packet.as_bytes(), Timeout::NoWait) {
            Ok(()) => {
                self.telemetry_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                self.telemetry_errors.fetch_add(1, Ordering::Relaxed);
                self.events.event(
                    ModuleId::Tlm,
                    EVENT_ID_TELEMETRY_SEND_FAILURE,
                    line!(),
                    [error as u32, 0, 0, 0, 0],
                );
            }
        }
    }

    /// Snapshots the telemetry module counters.
    pub fn get_status(&self) -> TlmStatus {
        TlmStatus {
            telemetry_sent: U32::new(
                self.telemetry_sent.load(Ordering::Relaxed),
            ),
            telemetry_errors: U32::new(
                self.telemetry_errors.load(Ordering::Relaxed),
            ),
        }
    }
}
