// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Monotonic time and the system clock tick.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Number of system clock ticks per second. Task periods, heartbeat
/// windows, and timeouts are all expressed in these ticks.
pub const TICKS_PER_SECOND: u32 = 100;

/// Number of nanoseconds per second.
pub const NANOSECONDS_PER_SECOND: u64 = 1_000_000_000;

/// Number of nanoseconds per system clock tick.
pub const NANOSECONDS_PER_TICK: u64 =
    NANOSECONDS_PER_SECOND / TICKS_PER_SECOND as u64;

/// A monotonic timestamp. Seconds count up from the first time query in
/// the process and never regress.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct Timestamp {
    pub seconds: u64,
    pub nanoseconds: u32,
}

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Returns the current monotonic time.
pub fn timestamp() -> Timestamp {
    let elapsed = epoch().elapsed();
    Timestamp {
        seconds: elapsed.as_secs(),
        nanoseconds: elapsed.subsec_nanos(),
    }
}

/// Returns the current monotonic time as seconds in a double.
pub fn timestamp_double() -> f64 {
    let now = timestamp();
    now.seconds as f64
        + now.nanoseconds as f64 / NANOSECONDS_PER_SECOND as f64
}

/// Converts a tick count to a wall duration.
pub fn ticks_to_duration(ticks: u32) -> Duration {
    Duration::from_nanos(u64::from(ticks) * NANOSECONDS_PER_TICK)
}

/// Sleeps for the given number of system clock ticks.
///
/// The sleep is against an absolute deadline, so an early wakeup (for
/// instance by a signal on POSIX hosts) drains the remaining time rather
/// than returning short.
pub fn task_delay(ticks: u32) {
    let deadline = Instant::now() + ticks_to_duration(ticks);
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(deadline - now);
    }
}
