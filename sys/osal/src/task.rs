// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task spawning and status.
//!
//! A task is an OS thread running a body to completion. The spawn
//! wrapper tracks the body's fate so the scheduler can poll a task's
//! health: a task that panicked reports [`TaskStatus::Crashed`], one
//! that returned while the system was still running reports
//! [`TaskStatus::Unknown`], and a live task reports [`TaskStatus::Okay`].
//!
//! Priorities run from 0 (most urgent) to [`MAX_PRIORITY`]. When the
//! process has the privilege to do so (root on UNIX hosts), the thread
//! is moved to the FIFO real-time scheduling class with the priority
//! inverted to match the OS convention; otherwise the priority is
//! recorded but advisory.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::{OsError, OsResult};

/// Largest accepted priority value (least urgent).
pub const MAX_PRIORITY: u8 = 99;

const STATE_RUNNING: u8 = 0;
const STATE_EXITED: u8 = 1;
const STATE_CRASHED: u8 = 2;

/// Best-effort health of a spawned task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    /// The task is running normally.
    Okay,
    /// The task's thread is gone for a reason the OS cannot report.
    Unknown,
    /// The task's thread panicked.
    Crashed,
}

/// Handle to a spawned task. The thread itself is detached; the handle
/// only observes its fate.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    state: Arc<AtomicU8>,
}

impl TaskHandle {
    pub fn status(&self) -> TaskStatus {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => TaskStatus::Okay,
            STATE_CRASHED => TaskStatus::Crashed,
            _ => TaskStatus::Unknown,
        }
    }
}

/// Spawns a detached OS thread running `body`.
pub fn spawn(
    name: &str,
    body: impl FnOnce() + Send + 'static,
    priority: u8,
    stack_size: usize,
) -> OsResult<TaskHandle> {
    if stack_size == 0 || priority > MAX_PRIORITY {
        return Err(OsError::InvalidArguments);
    }

    let state = Arc::new(AtomicU8::new(STATE_RUNNING));
    let task_state = Arc::clone(&state);
    std::thread::Builder::new()
        .name(name.to_string())
        .stack_size(stack_size)
        .spawn(move || {
            apply_priority(priority);
            let outcome = catch_unwind(AssertUnwindSafe(body));
            let fate = match outcome {
                Ok(()) => STATE_EXITED,
                Err(_) => STATE_CRASHED,
            };
            task_state.store(fate, Ordering::SeqCst);
        })
        .map_err(|_| OsError::Other)?;
    Ok(TaskHandle { state })
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Moves the calling thread into SCHED_FIFO at the requested
        /// priority. Requires privilege; without it the call is skipped,
        /// matching the usual OSAL behavior on development hosts.
        fn apply_priority(priority: u8) {
            // Safety: geteuid has no preconditions.
            if unsafe { libc::geteuid() } != 0 {
                return;
            }
            // Our priorities put 0 first; SCHED_FIFO puts the largest
            // number first.
            let fifo = i32::from(MAX_PRIORITY - priority).clamp(1, 99);
            let param = libc::sched_param { sched_priority: fifo };
            // Safety: pthread_self is the calling thread and param is a
            // valid sched_param. Failure leaves the default policy in
            // place, which is all we can do about it.
            unsafe {
                libc::pthread_setschedparam(
                    libc::pthread_self(),
                    libc::SCHED_FIFO,
                    &param,
                );
            }
        }
    } else {
        fn apply_priority(_priority: u8) {}
    }
}
