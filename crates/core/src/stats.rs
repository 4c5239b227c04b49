use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Lifecycle of the block monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Halted,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorState::Idle => "idle",
            MonitorState::Running => "running",
            MonitorState::Halted => "halted",
        }
    }
}

/// Counters shared between the block monitor (single writer) and the
/// health/status endpoints (readers). Atomics everywhere except the last
/// notification time, which takes a coarse lock.
#[derive(Debug)]
pub struct MonitorStats {
    state: AtomicU8,
    total_blocks_discovered: AtomicU64,
    consecutive_errors: AtomicU32,
    /// 0 means "no block seen yet".
    last_block_timestamp: AtomicU64,
    started: Instant,
    started_at: DateTime<Utc>,
    last_notification: Mutex<Option<DateTime<Utc>>>,
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorStats {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(MonitorState::Idle as u8),
            total_blocks_discovered: AtomicU64::new(0),
            consecutive_errors: AtomicU32::new(0),
            last_block_timestamp: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Utc::now(),
            last_notification: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MonitorState {
        match self.state.load(Ordering::Relaxed) {
            1 => MonitorState::Running,
            2 => MonitorState::Halted,
            _ => MonitorState::Idle,
        }
    }

    pub fn set_state(&self, state: MonitorState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record_discovery(&self, block_timestamp: u64) {
        self.total_blocks_discovered.fetch_add(1, Ordering::Relaxed);
        self.last_block_timestamp.store(block_timestamp, Ordering::Relaxed);
        *self.last_notification.lock() = Some(Utc::now());
    }

    /// Returns the incremented count.
    pub fn record_error(&self) -> u32 {
        self.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset_errors(&self) {
        self.consecutive_errors.store(0, Ordering::Relaxed);
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Relaxed)
    }

    pub fn total_blocks_discovered(&self) -> u64 {
        self.total_blocks_discovered.load(Ordering::Relaxed)
    }

    pub fn last_block_timestamp(&self) -> Option<u64> {
        match self.last_block_timestamp.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }

    pub fn last_notification(&self) -> Option<DateTime<Utc>> {
        *self.last_notification.lock()
    }

    pub fn is_healthy(&self, max_error_count: u32) -> bool {
        self.state() == MonitorState::Running && self.consecutive_errors() < max_error_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_counter_resets_on_success() {
        let stats = MonitorStats::new();
        assert_eq!(stats.record_error(), 1);
        assert_eq!(stats.record_error(), 2);
        stats.reset_errors();
        assert_eq!(stats.consecutive_errors(), 0);
    }

    #[test]
    fn health_requires_running_below_ceiling() {
        let stats = MonitorStats::new();
        assert!(!stats.is_healthy(10)); // idle

        stats.set_state(MonitorState::Running);
        assert!(stats.is_healthy(10));

        for _ in 0..10 {
            stats.record_error();
        }
        assert!(!stats.is_healthy(10));

        stats.reset_errors();
        stats.set_state(MonitorState::Halted);
        assert!(!stats.is_healthy(10));
    }

    #[test]
    fn discovery_updates_counters() {
        let stats = MonitorStats::new();
        assert_eq!(stats.last_block_timestamp(), None);

        stats.record_discovery(1_722_470_400);
        stats.record_discovery(1_722_470_700);
        assert_eq!(stats.total_blocks_discovered(), 2);
        assert_eq!(stats.last_block_timestamp(), Some(1_722_470_700));
        assert!(stats.last_notification().is_some());
    }
}
