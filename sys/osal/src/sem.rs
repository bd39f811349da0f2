// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Counting semaphores.
//!
//! Semaphores start empty. The scheduler uses one as its slot gate and
//! one per periodic task as that task's release gate, so `give` must be
//! cheap and safe to call from a timer callback.

use std::sync::{Condvar, Mutex};

use crate::{time, OsError, OsResult, Timeout};

/// A counting semaphore with an initial count of zero.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<u32>,
    available: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the count, waking one waiter if any. The count
    /// saturates rather than wrapping if givers outpace takers for a
    /// very long time.
    pub fn give(&self) -> OsResult<()> {
        let mut count = self.count.lock().map_err(|_| OsError::Other)?;
        *count = count.saturating_add(1);
        self.available.notify_one();
        Ok(())
    }

    /// Decrements the count, blocking per `timeout` while it is zero.
    pub fn take(&self, timeout: Timeout) -> OsResult<()> {
        let mut count = self.count.lock().map_err(|_| OsError::Other)?;
        match timeout {
            Timeout::NoWait => {
                if *count == 0 {
                    return Err(OsError::Timeout);
                }
            }
            Timeout::Ticks(ticks) => {
                let (guard, result) = self
                    .available
                    .wait_timeout_while(
                        count,
                        time::ticks_to_duration(ticks),
                        |count| *count == 0,
                    )
                    .map_err(|_| OsError::Other)?;
                count = guard;
                if result.timed_out() && *count == 0 {
                    return Err(OsError::Timeout);
                }
            }
            Timeout::Forever => {
                count = self
                    .available
                    .wait_while(count, |count| *count == 0)
                    .map_err(|_| OsError::Other)?;
            }
        }
        *count -= 1;
        Ok(())
    }
}
