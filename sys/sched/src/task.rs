// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task records and the per-slot scheduling decision.

use std::sync::Arc;

use abi::MAX_TASK_NAME_LENGTH;
use osal::sem::Semaphore;
use osal::task::TaskHandle;

/// How a registered task interacts with the scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskKind {
    /// Spawned as a thread; released through its gate every
    /// `schedule_period` slots and monitored for heartbeats.
    Periodic,
    /// Spawned as a thread; released by external producers through
    /// [`signal`](crate::TaskManager::signal) and monitored for
    /// heartbeats.
    Event,
    /// Not spawned; its function runs inline in the scheduler every
    /// `schedule_period` slots.
    Callback,
    /// An externally managed context; only its OS status is watched.
    Monitor,
}

pub(crate) type TaskBody = Box<dyn FnOnce() + Send + 'static>;
pub(crate) type TaskCallback = Box<dyn FnMut() + Send + 'static>;

/// What the scheduler should do with a task in the current slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum SlotAction {
    /// Nothing this slot.
    Wait,
    /// Release the task (or run its callback).
    Schedule,
    /// The task failed to check in within its heartbeat window.
    MissedHeartbeat,
}

/// Everything the task manager keeps about one registered task. Records
/// are created at registration and mutated only by the scheduler after
/// start.
pub(crate) struct TaskRecord {
    pub kind: TaskKind,
    pub name: heapless::String<MAX_TASK_NAME_LENGTH>,
    /// Thread body, present until `start` spawns it.
    pub body: Option<TaskBody>,
    /// Inline function for `Callback` tasks. Taken out of the record
    /// around each invocation.
    pub callback: Option<TaskCallback>,
    pub schedule_period: u32,
    pub heartbeat_period: u32,
    /// Slots since this task was last scheduled (or, for event tasks,
    /// last checked in).
    pub ticks: u32,
    pub stack_size: usize,
    pub priority: u8,
    pub gate: Option<Arc<Semaphore>>,
    pub handle: Option<TaskHandle>,
}

impl TaskRecord {
    /// Advances this task's tick count by one slot and decides what to
    /// do with it.
    ///
    /// For periodic tasks the schedule check (with its tick reset) runs
    /// before the heartbeat check. The order matters: when the
    /// heartbeat window equals the schedule period, the reset wins on
    /// the shared tick and the task is scheduled rather than flagged.
    /// The heartbeat can only fire when the window is shorter than the
    /// period, i.e. when the task failed to complete its previous cycle
    /// in time.
    pub(crate) fn update(&mut self) -> SlotAction {
        self.ticks += 1;
        match self.kind {
            TaskKind::Periodic => {
                let mut action = SlotAction::Wait;
                if self.ticks == self.schedule_period {
                    action = SlotAction::Schedule;
                    self.ticks = 0;
                }
                if self.ticks >= self.heartbeat_period {
                    action = SlotAction::MissedHeartbeat;
                }
                action
            }
            TaskKind::Event => {
                // Event tasks schedule themselves; the scheduler only
                // watches for a missing check-in.
                if self.ticks >= self.heartbeat_period {
                    SlotAction::MissedHeartbeat
                } else {
                    SlotAction::Wait
                }
            }
            TaskKind::Callback => {
                if self.ticks == self.schedule_period {
                    self.ticks = 0;
                    SlotAction::Schedule
                } else {
                    SlotAction::Wait
                }
            }
            // Monitor tasks are never scheduled and never miss
            // heartbeats.
            TaskKind::Monitor => SlotAction::Wait,
        }
    }
}

/// Copies `name` into a bounded task name, truncating if necessary.
pub(crate) fn bounded_name(
    name: &str,
) -> heapless::String<MAX_TASK_NAME_LENGTH> {
    let mut bounded = heapless::String::new();
    for c in name.chars() {
        if bounded.push(c).is_err() {
            break;
        }
    }
    bounded
}
