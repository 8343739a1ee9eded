//! Grace and timeout timers for the FSM.
//!
//! Both the "grace period" (§4.1.3) and "usage timeout" timers share the
//! same underlying shape: a starting instant plus a fixed duration. Only
//! the usage timeout carries the "zero duration disables it entirely"
//! carve-out (spec.md §4.1.3); grace has no such case and must expire on a
//! plain elapsed-time comparison even when `grace_period = 0`.

use std::time::{Duration, Instant};

/// A deadline measured from a start instant.
///
/// `start()` is idempotent in effect but not in the instant recorded: each
/// call resets the deadline, which is exactly the "grace idempotence"
/// invariant from spec.md §8 — re-entering a grace state must reset
/// `grace_start`.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineTimer {
    start: Instant,
}

impl DeadlineTimer {
    /// Start (or restart) the timer at `now`.
    pub fn start(now: Instant) -> Self {
        Self { start: now }
    }

    /// Whether more than `delta` has elapsed since the timer was started.
    ///
    /// `delta == Duration::ZERO` is treated as "never expires" — this is
    /// how `timeout_minutes = 0` disables usage timeouts (spec.md §4.1.3).
    /// Grace timers have no such carve-out; use [`Self::grace_expired`] for
    /// those.
    pub fn timeout_expired(&self, now: Instant, delta: Duration) -> bool {
        if delta.is_zero() {
            return false;
        }
        now.saturating_duration_since(self.start) > delta
    }

    /// Whether more than `delta` has elapsed since the timer was started.
    ///
    /// Unlike [`Self::timeout_expired`], `delta == Duration::ZERO` is not
    /// special-cased: spec.md §4.1.3 gives grace a plain
    /// `(now - grace_start) > grace_delta` with no disables-at-zero rule,
    /// and `user_exp.grace_period = 0` is a valid configuration value.
    pub fn grace_expired(&self, now: Instant, delta: Duration) -> bool {
        now.saturating_duration_since(self.start) > delta
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
