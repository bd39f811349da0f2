// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded message queues.
//!
//! A queue holds up to `depth` whole messages of up to `max_msg_size`
//! bytes each; both bounds are fixed at creation. Messages are copied in
//! on send and copied out on receive, never delivered partially, and
//! ordering is FIFO with a single priority class.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::{time, OsError, OsResult, Timeout};

#[derive(Debug)]
struct Inner {
    messages: VecDeque<Box<[u8]>>,
}

/// A bounded FIFO of byte messages.
#[derive(Debug)]
pub struct Queue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    depth: usize,
    max_msg_size: usize,
}

impl Queue {
    /// Creates a queue holding up to `depth` messages of up to
    /// `max_msg_size` bytes. Both must be nonzero.
    pub fn new(depth: usize, max_msg_size: usize) -> OsResult<Self> {
        if depth == 0 || max_msg_size == 0 {
            return Err(OsError::InvalidArguments);
        }
        Ok(Queue {
            inner: Mutex::new(Inner {
                messages: VecDeque::with_capacity(depth),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            depth,
            max_msg_size,
        })
    }

    /// The fixed per-message byte limit of this queue.
    pub fn max_msg_size(&self) -> usize {
        self.max_msg_size
    }

    /// Copies `message` into the queue, blocking per `timeout` while the
    /// queue is full.
    pub fn send(&self, message: &[u8], timeout: Timeout) -> OsResult<()> {
        if message.len() > self.max_msg_size {
            return Err(OsError::MsgSize);
        }
        let depth = self.depth;
        let mut inner = self.inner.lock().map_err(|_| OsError::Other)?;
        match timeout {
            Timeout::NoWait => {
                if inner.messages.len() == depth {
                    return Err(OsError::Timeout);
                }
            }
            Timeout::Ticks(ticks) => {
                let (guard, result) = self
                    .not_full
                    .wait_timeout_while(
                        inner,
                        time::ticks_to_duration(ticks),
                        |inner| inner.messages.len() == depth,
                    )
                    .map_err(|_| OsError::Other)?;
                inner = guard;
                if result.timed_out() && inner.messages.len() == depth {
                    return Err(OsError::Timeout);
                }
            }
            Timeout::Forever => {
                inner = self
                    .not_full
                    .wait_while(inner, |inner| {
                        inner.messages.len() == depth
                    })
                    .map_err(|_| OsError::Other)?;
            }
        }
        inner.messages.push_back(message.into());
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest message from the queue into `buffer`, blocking
    /// per `timeout` while the queue is empty. Returns the message
    /// length.
    ///
    /// `buffer` must be able to hold any message this queue can carry,
    /// so its length must be at least [`Queue::max_msg_size`].
    pub fn receive(
        &self,
        buffer: &mut [u8],
        timeout: Timeout,
    ) -> OsResult<usize> {
        if buffer.len() < self.max_msg_size {
            return Err(OsError::InvalidArguments);
        }
        let mut inner = self.inner.lock().map_err(|_| OsError::Other)?;
        match timeout {
            Timeout::NoWait => {
                if inner.messages.is_empty() {
                    return Err(OsError::Timeout);
                }
            }
            Timeout::Ticks(ticks) => {
                let (guard, result) = self
                    .not_empty
                    .wait_timeout_while(
                        inner,
                        time::ticks_to_duration(ticks),
                        |inner| inner.messages.is_empty(),
                    )
                    .map_err(|_| OsError::Other)?;
                inner = guard;
                if result.timed_out() && inner.messages.is_empty() {
                    return Err(OsError::Timeout);
                }
            }
            Timeout::Forever => {
                inner = self
                    .not_empty
                    .wait_while(inner, |inner| inner.messages.is_empty())
                    .map_err(|_| OsError::Other)?;
            }
        }
        // wait_* only return with the condition false, so the queue is
        // nonempty here.
        let message = match inner.messages.pop_front() {
            Some(message) => message,
            None => return Err(OsError::Other),
        };
        buffer[..message.len()].copy_from_slice(&message);
        self.not_full.notify_one();
        Ok(message.len())
    }
}
