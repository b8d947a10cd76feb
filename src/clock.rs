//! Wall-clock helpers and record ID allocation.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as milliseconds since the Unix epoch (UTC).
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

/// Current time as nanoseconds since the Unix epoch (UTC).
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_nanos() as i64
}

/// Allocator for record IDs when callers pass `id == 0`.
///
/// Seeded from the nanosecond clock once per engine open, then strictly
/// incrementing. Drawing from a counter instead of re-reading the clock
/// keeps batch appends collision-free on fast hardware.
pub struct IdAlloc {
    counter: AtomicI64,
}

impl IdAlloc {
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(now_nanos()),
        }
    }

    /// Next unique ID.
    pub fn next(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAlloc {
    fn default() -> Self {
        Self::new()
    }
}
