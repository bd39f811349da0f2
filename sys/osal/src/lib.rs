// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OS abstraction layer for the flight software runtime.
//!
//! The rest of the system interacts with the operating system only
//! through this crate: bounded message queues, counting semaphores, a
//! recursive mutex, periodic timers, task spawning, and a monotonic
//! clock. This is the hosted backend, built on `std` threads and
//! synchronization; the contracts are the same ones an RTOS backend
//! would satisfy, so timeouts are expressed in system clock ticks and
//! every operation returns a typed result.
//!
//! Blocking operations take a [`Timeout`]: `NoWait` polls, `Ticks(n)`
//! waits at most `n` clock ticks, `Forever` waits indefinitely.

pub mod mutex;
pub mod queue;
pub mod sem;
pub mod task;
pub mod time;
pub mod timer;

/// Errors reported by the OS abstraction.
///
/// The discriminants are stable: they are the codes that appear in
/// status telemetry when a module records the cause of its most recent
/// OS failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum OsError {
    /// A blocking operation ran out its timeout.
    Timeout = 3,
    /// A message was larger than the queue's fixed message size.
    MsgSize = 4,
    /// All timer slots are in use.
    MaxTimers = 5,
    /// The underlying OS call failed.
    Other = 6,
    /// An argument was out of range for the operation.
    InvalidArguments = 7,
    /// A queue could not be created.
    QueueCreate = 8,
}

impl OsError {
    /// The wire code for this error, as recorded in status structures.
    pub fn code(self) -> u32 {
        self as u32
    }
}

pub type OsResult<T> = Result<T, OsError>;

/// How long a blocking operation may wait, in system clock ticks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Timeout {
    /// Poll: fail with `OsError::Timeout` rather than block.
    NoWait,
    /// Block for at most this many clock ticks.
    Ticks(u32),
    /// Block until the operation can complete.
    Forever,
}
