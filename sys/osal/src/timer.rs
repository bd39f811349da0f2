// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic timers.
//!
//! A timer fires its callback at a fixed tick period until the callback
//! returns `false` or [`Timer::stop`] is called. Firing is scheduled
//! against absolute deadlines, so callback latency does not accumulate
//! drift. Timers come from a fixed pool; a slot is released when the
//! `Timer` is dropped.
//!
//! On this backend the callback runs on a dedicated thread rather than
//! in signal context, but callers must still treat it as constrained:
//! the system uses it only to give a semaphore.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::{time, OsError, OsResult};

/// Number of timers that may exist at once.
pub const MAX_TIMERS: usize = 32;

static TIMERS_IN_USE: AtomicUsize = AtomicUsize::new(0);

/// A periodic timer slot.
#[derive(Debug)]
pub struct Timer {
    armed: Mutex<Option<Arc<AtomicBool>>>,
}

impl Timer {
    /// Claims a timer slot from the pool.
    pub fn create() -> OsResult<Self> {
        TIMERS_IN_USE
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |in_use| {
                (in_use < MAX_TIMERS).then_some(in_use + 1)
            })
            .map_err(|_| OsError::MaxTimers)?;
        Ok(Timer {
            armed: Mutex::new(None),
        })
    }

    /// Starts the timer with the given period. `callback` runs once per
    /// period and keeps the timer running by returning `true`; returning
    /// `false` stops it after that invocation. Restarting a running
    /// timer replaces its callback and period.
    pub fn start<F>(&self, period_ticks: u32, mut callback: F) -> OsResult<()>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if period_ticks == 0 {
            return Err(OsError::InvalidArguments);
        }
        let mut armed = self.armed.lock().map_err(|_| OsError::Other)?;
        if let Some(old) = armed.take() {
            old.store(false, Ordering::SeqCst);
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let period = time::ticks_to_duration(period_ticks);
        std::thread::Builder::new()
            .name("os-timer".into())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                while flag.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if now < deadline {
                        std::thread::sleep(deadline - now);
                        continue;
                    }
                    if !flag.load(Ordering::SeqCst) {
                        break;
                    }
                    if !callback() {
                        flag.store(false, Ordering::SeqCst);
                        break;
                    }
                    deadline += period;
                }
            })
            .map_err(|_| OsError::Other)?;
        *armed = Some(running);
        Ok(())
    }

    /// Stops the timer. Idempotent; a firing already in progress
    /// completes.
    pub fn stop(&self) -> OsResult<()> {
        let armed = self.armed.lock().map_err(|_| OsError::Other)?;
        if let Some(running) = armed.as_ref() {
            running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let _ = self.stop();
        TIMERS_IN_USE.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn fires_repeatedly_until_stopped() {
        let timer = Timer::create().unwrap();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        timer
            .start(1, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap();
        std::thread::sleep(time::ticks_to_duration(10));
        timer.stop().unwrap();
        let at_stop = fired.load(Ordering::SeqCst);
        assert!(at_stop >= 5, "only fired {at_stop} times in 10 ticks");

        // no further firings once stopped (allow one in flight)
        std::thread::sleep(time::ticks_to_duration(5));
        assert!(fired.load(Ordering::SeqCst) <= at_stop + 1);
    }

    #[test]
    fn callback_false_stops_the_timer() {
        let timer = Timer::create().unwrap();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        timer
            .start(1, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            })
            .unwrap();
        std::thread::sleep(time::ticks_to_duration(8));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_period_is_rejected() {
        let timer = Timer::create().unwrap();
        assert_eq!(
            timer.start(0, || true).err(),
            Some(OsError::InvalidArguments)
        );
    }

    #[test]
    fn pool_is_bounded_and_slots_are_released() {
        // Other tests in this binary may hold a few slots concurrently,
        // so claim until the pool runs dry rather than asserting an
        // exact count.
        let mut held = Vec::new();
        let exhausted = loop {
            match Timer::create() {
                Ok(timer) => held.push(timer),
                Err(error) => break error,
            }
        };
        assert_eq!(exhausted, OsError::MaxTimers);
        assert!(held.len() >= MAX_TIMERS - 4);

        drop(held);
        std::thread::sleep(Duration::from_millis(10));
        let reclaimed = Timer::create();
        assert!(reclaimed.is_ok());
    }
}
