//! Heartbeat scheduling and adapter liveness
//!
//! Both types take the current [`Instant`] as a parameter so the timer thread
//! owns the clock and tests can drive them deterministically.

use std::time::{Duration, Instant};

use tracing::warn;

/// One fired heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTick {
    /// Zero-based heartbeat number
    pub index: u64,
    /// When this heartbeat was due
    pub scheduled: Instant,
    /// How far the following heartbeat is already overdue, if at all
    pub behind: Option<Duration>,
}

/// Drift-compensating heartbeat schedule
///
/// Heartbeat `n` is due at `start + n * interval`. Each next due time is
/// computed from the previous *scheduled* time, not from when the previous
/// heartbeat actually went out, so send latency never accumulates.
#[derive(Debug, Clone)]
pub struct HeartbeatSchedule {
    interval: Duration,
    next_due: Instant,
    fired: u64,
}

impl HeartbeatSchedule {
    /// Schedule whose first heartbeat is due at `start`
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next_due: start,
            fired: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Time left until the next heartbeat, zero if overdue
    pub fn delay(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Consume the due heartbeat and schedule the next one
    pub fn advance(&mut self, now: Instant) -> HeartbeatTick {
        let scheduled = self.next_due;
        let index = self.fired;
        self.fired += 1;
        self.next_due = scheduled + self.interval;

        let behind = (now > self.next_due).then(|| now - self.next_due);
        if let Some(lag) = behind {
            warn!(
                index,
                lag_ms = lag.as_millis() as u64,
                "Heartbeat timer behind schedule, next heartbeat fires immediately"
            );
        }

        HeartbeatTick {
            index,
            scheduled,
            behind,
        }
    }
}

/// Why the watchdog declared the adapter dead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessReason {
    Idle,
    HeartbeatFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessFailure {
    pub reason: LivenessReason,
    pub idle: Duration,
    pub failures: u32,
}

/// Adapter liveness tracker
///
/// Any successfully decoded inbound frame resets the idle clock. The adapter
/// is declared dead once, when the idle time reaches the grace window or
/// heartbeat writes fail too many times in a row.
#[derive(Debug, Clone)]
pub struct LivenessWatchdog {
    interval: Duration,
    grace: Duration,
    max_failures: u32,
    last_inbound: Instant,
    last_heartbeat: Option<Instant>,
    consecutive_failures: u32,
    tripped: bool,
}

impl LivenessWatchdog {
    pub fn new(now: Instant, interval: Duration, grace: Duration, max_failures: u32) -> Self {
        Self {
            interval,
            grace,
            max_failures: max_failures.max(1),
            last_inbound: now,
            last_heartbeat: None,
            consecutive_failures: 0,
            tripped: false,
        }
    }

    /// Restart tracking from `now`, clearing any earlier verdict
    pub fn reset(&mut self, now: Instant) {
        self.last_inbound = now;
        self.last_heartbeat = None;
        self.consecutive_failures = 0;
        self.tripped = false;
    }

    pub fn record_inbound(&mut self, now: Instant) {
        if now > self.last_inbound {
            self.last_inbound = now;
        }
    }

    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_inbound)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Idle-triggered policy: quiet for a full interval and no heartbeat
    /// sent within the last interval
    pub fn should_send_heartbeat(&self, now: Instant) -> bool {
        if self.tripped || self.idle(now) < self.interval {
            return false;
        }
        self.last_heartbeat
            .is_none_or(|sent| now.saturating_duration_since(sent) >= self.interval)
    }

    pub fn record_heartbeat_result(&mut self, now: Instant, ok: bool) {
        self.last_heartbeat = Some(now);
        if ok {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
    }

    /// Evaluate liveness; returns the failure exactly once
    pub fn check(&mut self, now: Instant) -> Option<LivenessFailure> {
        if self.tripped {
            return None;
        }

        let idle = self.idle(now);
        let reason = if self.consecutive_failures >= self.max_failures {
            LivenessReason::HeartbeatFailures
        } else if idle >= self.grace {
            LivenessReason::Idle
        } else {
            return None;
        };

        self.tripped = true;
        Some(LivenessFailure {
            reason,
            idle,
            failures: self.consecutive_failures,
        })
    }
}
