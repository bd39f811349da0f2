// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A recursive mutex with timed acquisition.
//!
//! Unlike the queues and semaphores, this lock is identified with the
//! holding thread: the owner may take it again without deadlocking, and
//! must give it once per take.

use std::sync::{Condvar, Mutex as StdMutex};
use std::thread::{self, ThreadId};

use crate::{time, OsError, OsResult, Timeout};

#[derive(Debug, Default)]
struct Inner {
    owner: Option<ThreadId>,
    count: u32,
}

/// A recursive mutex.
#[derive(Debug, Default)]
pub struct Mutex {
    inner: StdMutex<Inner>,
    released: Condvar,
}

impl Mutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the mutex, blocking per `timeout` while another thread
    /// holds it. Re-acquisition by the owner always succeeds
    /// immediately.
    pub fn take(&self, timeout: Timeout) -> OsResult<()> {
        let me = thread::current().id();
        let mut inner = self.inner.lock().map_err(|_| OsError::Other)?;
        if inner.owner == Some(me) {
            inner.count += 1;
            return Ok(());
        }
        match timeout {
            Timeout::NoWait => {
                if inner.owner.is_some() {
                    return Err(OsError::Timeout);
                }
            }
            Timeout::Ticks(ticks) => {
                let (guard, result) = self
                    .released
                    .wait_timeout_while(
                        inner,
                        time::ticks_to_duration(ticks),
                        |inner| inner.owner.is_some(),
                    )
                    .map_err(|_| OsError::Other)?;
                inner = guard;
                if result.timed_out() && inner.owner.is_some() {
                    return Err(OsError::Timeout);
                }
            }
            Timeout::Forever => {
                inner = self
                    .released
                    .wait_while(inner, |inner| inner.owner.is_some())
                    .map_err(|_| OsError::Other)?;
            }
        }
        inner.owner = Some(me);
        inner.count = 1;
        Ok(())
    }

    /// Releases one level of ownership. Fails if the calling thread is
    /// not the owner.
    pub fn give(&self) -> OsResult<()> {
        let me = thread::current().id();
        let mut inner = self.inner.lock().map_err(|_| OsError::Other)?;
        if inner.owner != Some(me) {
            return Err(OsError::InvalidArguments);
        }
        inner.count -= 1;
        if inner.count == 0 {
            inner.owner = None;
            self.released.notify_one();
        }
        Ok(())
    }
}
