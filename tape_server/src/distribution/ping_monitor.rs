//! Keep-alive tracker for remote tapes.
//!
//! Records the last time each tape (by `SocketAddr`) was heard from and reports the ones
//! that have been silent longer than the timeout. Reported tapes are forgotten until they
//! ping again. Not synchronized; share it behind a `Mutex`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Tracks tape keep-alive pings and finds silent tapes.
#[derive(Debug)]
pub struct PingMonitor {
    last_seen: HashMap<SocketAddr, Instant>,
    timeout: Duration,
}

impl PingMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            timeout,
        }
    }

    /// Marks `addr` as alive now.
    pub fn update_ping(&mut self, addr: SocketAddr) {
        self.last_seen.insert(addr, Instant::now());
    }

    /// Removes and returns every tape silent for longer than the timeout.
    pub fn check_timeouts(&mut self) -> Vec<SocketAddr> {
        self.check_timeouts_at(Instant::now())
    }

    fn check_timeouts_at(&mut self, now: Instant) -> Vec<SocketAddr> {
        let timeout = self.timeout;
        let mut timed_out = Vec::new();

        self.last_seen.retain(|addr, last_ping| {
            if now.saturating_duration_since(*last_ping) > timeout {
                timed_out.push(*addr);
                false
            } else {
                true
            }
        });
        timed_out
    }

    pub fn is_client_active(&self, addr: &SocketAddr) -> bool {
        self.last_seen.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
