//! Session tunables

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the timer thread decides to send a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatPolicy {
    /// One heartbeat per interval on a drift-compensated schedule
    FixedCadence,
    /// Only when nothing arrived from the adapter for a full interval
    IdleTriggered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub heartbeat_interval: Duration,
    pub heartbeat_policy: HeartbeatPolicy,
    /// Watchdog grace window, in heartbeat intervals
    pub liveness_grace_factor: u32,
    /// Consecutive failed heartbeat writes before the adapter is declared dead
    pub max_heartbeat_failures: u32,
    /// Delay between the end of the init sequence and `wifiConnect`
    pub connect_delay: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Frames longer than this are read and thrown away
    pub max_frame_len: usize,
    pub join_timeout: Duration,
    /// Chunk size used when discarding oversized or undeliverable payloads
    pub discard_chunk: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(2),
            heartbeat_policy: HeartbeatPolicy::FixedCadence,
            liveness_grace_factor: 3,
            max_heartbeat_failures: 2,
            connect_delay: Duration::from_secs(1),
            read_timeout: Duration::from_millis(250),
            write_timeout: Duration::from_secs(1),
            max_frame_len: link_protocol::MAX_PAYLOAD_SIZE,
            join_timeout: Duration::from_secs(2),
            discard_chunk: 64 * 1024,
        }
    }
}

impl SessionOptions {
    /// Idle time after which the adapter is declared dead
    pub fn liveness_grace(&self) -> Duration {
        self.heartbeat_interval * self.liveness_grace_factor.max(1)
    }

    /// How often the timer thread wakes to evaluate the watchdog
    pub fn watchdog_poll(&self) -> Duration {
        (self.heartbeat_interval / 4).clamp(Duration::from_millis(5), Duration::from_millis(500))
    }
}
