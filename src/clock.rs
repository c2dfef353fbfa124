//! Process-relative time source for lease expiry.
//!
//! Lease expiries are stored as whole seconds since the server started rather
//! than as wall-clock timestamps. A `u32` of seconds covers roughly 136 years
//! of uptime, so expiry arithmetic never has to deal with absolute time or
//! clock adjustments.

use std::time::Instant;

/// Counts whole seconds from the moment it was created.
///
/// The clock is `Copy`; every copy shares the same epoch, so all workers
/// started from one clock agree on "now".
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose epoch is the current instant.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Returns the whole seconds elapsed since the epoch.
    ///
    /// Sub-second precision is discarded. Saturates at `u32::MAX`.
    pub fn seconds_since_start(&self) -> u32 {
        u32::try_from(self.epoch.elapsed().as_secs()).unwrap_or(u32::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
