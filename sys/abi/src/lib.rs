// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared ABI definitions for the flight software runtime: packet wire
//! formats, packet and module identifiers, per-module status counter
//! layouts, and the compile-time configuration constants.
//!
//! Everything that crosses the message bus is defined here so that
//! producers and consumers agree on layout by construction. All wire
//! structs are little-endian, tightly packed, and readable/writable as
//! plain bytes through `zerocopy`; nothing in this crate allocates or
//! depends on the host OS.

#![cfg_attr(target_os = "none", no_std)]

use num_derive::FromPrimitive;
use zerocopy::byteorder::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Maximum number of tasks that can be registered with the task manager.
///
/// The scheduled/missed-heartbeat bitmaps are `u64`, so this may not
/// exceed 64 (checked below).
pub const MAX_TASKS: usize = 64;

/// Maximum number of pipes that can exist within the system.
pub const MAX_NUM_PIPES: usize = 100;

/// Maximum number of pipes that can be registered for a single packet id.
pub const MAX_PIPES_PER_PACKET: usize = 10;

/// Maximum length of a task name, in bytes. Longer names are truncated at
/// registration.
pub const MAX_TASK_NAME_LENGTH: usize = 32;

/// Default stack size for spawned tasks.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

static_assertions::const_assert!(MAX_TASKS <= 64);

/// Offset distinguishing system-wide event ids from module-specific ones
/// (module-specific ids count up from 1).
pub const EVENT_BASE_ID: u16 = 1000;

/// Event reporting a message that was too short or inconsistent to carry
/// its own header.
pub const EVENT_ID_MALFORMED_PACKET: u16 = EVENT_BASE_ID + 1;

/// Event reporting a failed system initialization. Parameters 0 and 1 are
/// the high and low halves of the failing-module bitmask (bit n = module
/// id n failed), and parameter 2 is a flag indicating whether task start
/// succeeded.
pub const EVENT_ID_INIT_ERROR: u16 = EVENT_BASE_ID + 2;

/// Whether a packet carries telemetry or a command.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum PacketType {
    Invalid = 0,
    Command = 1,
    Telemetry = 2,
}

/// Identifies which message structure a packet contains.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum PacketId {
    Invalid = 0,
    HealthAndStatus = 1,
    Event = 2,
    Command = 3,
}

/// Number of packet ids, including the invalid sentinel. Subscription
/// tables are indexed by packet id.
pub const NUM_PACKET_IDS: usize = 4;

/// Every module within the system. A new module gets the next id here;
/// ids appear on the wire in event records, so existing values must not
/// be renumbered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u32)]
pub enum ModuleId {
    Invalid = 0,
    Init = 1,
    Em = 2,
    Mb = 3,
    Tlm = 4,
    Tm = 5,
    Tbl = 6,
}

/// Number of module ids, including the invalid sentinel.
pub const NUM_MODULE_IDS: u32 = 7;

impl ModuleId {
    /// Decodes a wire value into a module id, if it names one.
    pub fn from_raw(raw: u32) -> Option<Self> {
        num_traits::FromPrimitive::from_u32(raw)
    }
}

/// Result type for header construction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum MsgError {
    /// The packet id was the invalid sentinel.
    InvalidPacketId = 3,
}

/// The header stamped on every message that crosses the bus.
///
/// `length` counts the payload bytes *after* the header, so a full frame
/// occupies `HEADER_SIZE + length` bytes.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct MsgHeader {
    pub packet_type: u8,
    pub packet_id: u8,
    pub length: U16,
}

/// Size of a `MsgHeader` on the wire.
pub const HEADER_SIZE: usize = core::mem::size_of::<MsgHeader>();

static_assertions::const_assert_eq!(HEADER_SIZE, 4);

impl MsgHeader {
    fn stamped(
        packet_type: PacketType,
        packet_id: PacketId,
        payload_bytes: u16,
    ) -> Result<Self, MsgError> {
        if packet_id == PacketId::Invalid {
            return Err(MsgError::InvalidPacketId);
        }
        Ok(MsgHeader {
            packet_type: packet_type as u8,
            packet_id: packet_id as u8,
            length: U16::new(payload_bytes),
        })
    }

    /// Stamps a telemetry header for `packet_id` with `payload_bytes` of
    /// data following the header.
    pub fn telemetry(
        packet_id: PacketId,
        payload_bytes: u16,
    ) -> Result<Self, MsgError> {
        Self::stamped(PacketType::Telemetry, packet_id, payload_bytes)
    }

    /// Stamps a command header for `packet_id` with `payload_bytes` of
    /// data following the header.
    pub fn command(
        packet_id: PacketId,
        payload_bytes: u16,
    ) -> Result<Self, MsgError> {
        Self::stamped(PacketType::Command, packet_id, payload_bytes)
    }

    /// Decodes the packet type field, if it holds a known value.
    pub fn packet_type(&self) -> Option<PacketType> {
        num_traits::FromPrimitive::from_u8(self.packet_type)
    }

    /// Decodes the packet id field, if it holds a known value.
    pub fn packet_id(&self) -> Option<PacketId> {
        num_traits::FromPrimitive::from_u8(self.packet_id)
    }

    /// Total frame size implied by this header.
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + usize::from(self.length.get())
    }
}

/// A structured diagnostic record, published on the bus under
/// `PacketId::Event`.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct EventRecord {
    pub header: MsgHeader,
    pub module: U32,
    pub event_id: U16,
    pub line_number: U16,
    pub params: [U32; 5],
}

/// Payload size of an event record (everything after the header).
pub const EVENT_PAYLOAD_SIZE: usize =
    core::mem::size_of::<EventRecord>() - HEADER_SIZE;

static_assertions::const_assert_eq!(EVENT_PAYLOAD_SIZE, 32);

impl EventRecord {
    /// Builds a fully stamped event record. The line number is truncated
    /// to 16 bits on the wire.
    pub fn new(
        module: ModuleId,
        event_id: u16,
        line_number: u32,
        params: [u32; 5],
    ) -> Self {
        EventRecord {
            header: MsgHeader {
                packet_type: PacketType::Telemetry as u8,
                packet_id: PacketId::Event as u8,
                length: U16::new(EVENT_PAYLOAD_SIZE as u16),
            },
            module: U32::new(module as u32),
            event_id: U16::new(event_id),
            line_number: U16::new(line_number as u16),
            params: params.map(U32::new),
        }
    }
}

/// Status counters of the telemetry module.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct TlmStatus {
    pub telemetry_sent: U32,
    pub telemetry_errors: U32,
}

/// Status counters of the message bus, including the cause of the most
/// recent send and receive failures.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct MbStatus {
    pub messages_sent: U32,
    pub send_errors: U32,
    pub messages_received: U32,
    pub receive_errors: U32,
    pub last_send_packet: U16,
    pub last_send_pipe: U16,
    pub last_send_error: U16,
    pub last_receive_pipe: U16,
    pub last_receive_error: U16,
}

/// Status counters of the event message module.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct EmStatus {
    pub messages_received: U32,
    pub messages_sent: U32,
    pub message_errors: U32,
    pub invalid_messages_received: U32,
}

/// Status counters of the table module. The table store itself is
/// hardware-dependent and not part of this runtime; the slot is carried
/// in the health packet so the layout is complete.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct TblStatus {
    pub tables_read_ram: U16,
    pub tables_read_stored: U16,
    pub tables_updated_ram: U16,
    pub tables_updated_stored: U16,
    pub table_read_errors: U16,
}

/// Status of the task manager. The bitmaps assign bit n to task id n and
/// are sticky: bits are set by the scheduler and cleared only at
/// initialization.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct TmStatus {
    pub cycle: U32,
    pub tasks_scheduled: U64,
    pub tasks_missed_heartbeat: U64,
}

/// The health-and-status packet: every module's counters, concatenated in
/// a fixed order.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct HealthAndStatus {
    pub header: MsgHeader,
    pub tlm: TlmStatus,
    pub mb: MbStatus,
    pub em: EmStatus,
    pub tbl: TblStatus,
    pub tm: TmStatus,
}

/// Payload size of the health-and-status packet.
pub const HEALTH_AND_STATUS_PAYLOAD_SIZE: usize =
    core::mem::size_of::<HealthAndStatus>() - HEADER_SIZE;

impl HealthAndStatus {
    /// Assembles a fully stamped health-and-status packet from module
    /// status snapshots.
    pub fn new(
        tlm: TlmStatus,
        mb: MbStatus,
        em: EmStatus,
        tbl: TblStatus,
        tm: TmStatus,
    ) -> Self {
        HealthAndStatus {
            header: MsgHeader {
                packet_type: PacketType::Telemetry as u8,
                packet_id: PacketId::HealthAndStatus as u8,
                length: U16::new(HEALTH_AND_STATUS_PAYLOAD_SIZE as u16),
            },
            tlm,
            mb,
            em,
            tbl,
            tm,
        }
    }
}

/// Names a task slot in the task manager, in `0..MAX_TASKS`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct TaskId(pub u16);

impl TaskId {
    /// The slot index this id names.
    pub fn index(&self) -> usize {
        usize::from(self.0)
    }
}

/// Names a pipe owned by the message bus. Indices are assigned
/// monotonically from zero and never reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct PipeId(pub u16);

impl PipeId {
    pub fn index(&self) -> usize {
        usize::from(self.0)
    }
}

/// Task priority. Lower numbers are more urgent; 0 is reserved for the
/// scheduler itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct Priority(pub u8);

/// The seam through which the message bus reports its own diagnostics.
///
/// The bus cannot depend on the event module (the event module publishes
/// *through* the bus), so the bootstrap installs the event module here
/// after both exist. Implementations must never call back into
/// `MessageBus::send` recursively on failure.
pub trait EventSink: Send + Sync {
    fn event(
        &self,
        module: ModuleId,
        event_id: u16,
        line_number: u32,
        params: [u32; 5],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;
    use proptest::prelude::*;

    #[test]
    fn header_layout() {
        let header = MsgHeader::telemetry(PacketId::HealthAndStatus, 0x1234)
            .unwrap();
        assert_eq!(header.as_bytes(), &[0x02, 0x01, 0x34, 0x12]);
    }

    #[test]
    fn header_rejects_invalid_packet_id() {
        assert_eq!(
            MsgHeader::telemetry(PacketId::Invalid, 0),
            Err(MsgError::InvalidPacketId)
        );
        assert_eq!(
            MsgHeader::command(PacketId::Invalid, 0),
            Err(MsgError::InvalidPacketId)
        );
    }

    #[test]
    fn packet_id_range_is_checked_at_the_byte_boundary() {
        assert_eq!(PacketId::from_u8(0), Some(PacketId::Invalid));
        assert_eq!(PacketId::from_u8(3), Some(PacketId::Command));
        assert_eq!(PacketId::from_u8(NUM_PACKET_IDS as u8), None);
        assert_eq!(ModuleId::from_u32(NUM_MODULE_IDS), None);
    }

    #[test]
    fn event_record_layout() {
        let record = EventRecord::new(
            ModuleId::Em,
            7,
            0x0001_0002, // truncates to 0x0002 on the wire
            [1, 2, 3, 4, 5],
        );
        let bytes = record.as_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + EVENT_PAYLOAD_SIZE);
        // header
        assert_eq!(&bytes[..4], &[0x02, 0x02, 32, 0]);
        // module id
        assert_eq!(&bytes[4..8], &[2, 0, 0, 0]);
        // event id, truncated line number
        assert_eq!(&bytes[8..12], &[7, 0, 2, 0]);
        // first parameter
        assert_eq!(&bytes[12..16], &[1, 0, 0, 0]);
    }

    #[test]
    fn health_packet_is_packed() {
        assert_eq!(core::mem::size_of::<TlmStatus>(), 8);
        assert_eq!(core::mem::size_of::<MbStatus>(), 26);
        assert_eq!(core::mem::size_of::<EmStatus>(), 16);
        assert_eq!(core::mem::size_of::<TblStatus>(), 10);
        assert_eq!(core::mem::size_of::<TmStatus>(), 20);
        assert_eq!(
            core::mem::size_of::<HealthAndStatus>(),
            HEADER_SIZE + 8 + 26 + 16 + 10 + 20
        );
    }

    proptest! {
        // Building a header and reading it back through the byte
        // representation round-trips every field, for both builders.
        #[test]
        fn header_round_trip(raw_id in 1u8..4, length in 0u16..=u16::MAX,
                             command in proptest::bool::ANY) {
            let packet_id = PacketId::from_u8(raw_id).unwrap();
            let header = if command {
                MsgHeader::command(packet_id, length).unwrap()
            } else {
                MsgHeader::telemetry(packet_id, length).unwrap()
            };
            let decoded =
                MsgHeader::read_from_bytes(header.as_bytes()).unwrap();
            prop_assert_eq!(decoded.packet_id(), Some(packet_id));
            prop_assert_eq!(
                decoded.packet_type(),
                Some(if command {
                    PacketType::Command
                } else {
                    PacketType::Telemetry
                })
            );
            prop_assert_eq!(decoded.length.get(), length);
            prop_assert_eq!(decoded.frame_size(), 4 + usize::from(length));
        }
    }
}
