//! Clock sources for sample timestamps
//!
//! Samples are stamped server-side at microsecond precision. The system clock
//! never hands out a timestamp earlier than one it already returned, so an NTP
//! step backwards cannot reorder samples within a shard.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for stamping samples and deriving hook context.
pub trait Clock: Send + Sync {
    /// Current UTC time, truncated to microseconds.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock with a monotonic high-water mark.
pub struct SystemClock {
    /// Largest timestamp handed out so far (micros since epoch)
    high_water_us: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            high_water_us: AtomicI64::new(0),
        }
    }

    /// Returns a non-decreasing microsecond timestamp.
    ///
    /// If the wall clock has gone backward, the previous high-water mark is
    /// returned instead.
    pub fn now_micros(&self) -> i64 {
        let wall = Utc::now().timestamp_micros();
        loop {
            let prev = self.high_water_us.load(Ordering::Acquire);
            let ts = wall.max(prev);
            match self.high_water_us.compare_exchange_weak(
                prev,
                ts,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return ts,
                Err(_) => continue,
            }
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.now_micros()).unwrap_or_else(Utc::now)
    }
}

/// Manually driven clock, for tests and replay tooling.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(truncate_to_micros(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = truncate_to_micros(now);
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now = truncate_to_micros(*now + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Drops sub-microsecond precision so persisted and in-memory values agree.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}
