use std::time::{Duration, Instant};

/// Fixed-cadence tick slots with single-slot semantics.
///
/// A tick that overruns its slot does not cause catch-up ticks: every slot that
/// elapsed while it ran is dropped and the next tick lands on the next slot
/// boundary.
#[derive(Clone, Debug)]
pub struct TickSchedule {
    interval: Duration,
    next: Instant,
}

impl TickSchedule {
    /// First tick is due at `start`.
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next: start,
        }
    }

    pub fn next_due(&self) -> Instant {
        self.next
    }

    /// Time left before the next tick is due.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next
    }

    /// Mark the due tick finished at `now`. Returns how many slots were dropped.
    pub fn complete(&mut self, now: Instant) -> u64 {
        self.next += self.interval;
        let mut dropped = 0;
        while self.next < now {
            self.next += self.interval;
            dropped += 1;
        }
        dropped
    }
}
