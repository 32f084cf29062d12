// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Health checking for the designated-controller TCP connection.
//!
//! A connection is healthy if it passes data in both directions. Both ends
//! send an empty Root PDU (the Null vector) every heartbeat interval; any
//! received ACN PDU counts as proof of life. After three silent intervals
//! the on-timeout callback fires exactly once, and the owner is expected to
//! tear the socket down.
//!
//! The monitor itself is clock-driven and does no IO: the owner schedules a
//! reactor interval timer at the heartbeat cadence and calls [`tick`], and
//! wires the Root inflator's packet hook to [`pdu_received`].
//!
//! [`tick`]: HealthMonitor::tick
//! [`pdu_received`]: HealthMonitor::pdu_received

use crate::config::{E133_HEARTBEAT_INTERVAL, E133_MISSED_HEARTBEAT_LIMIT};
use std::time::{Duration, Instant};

/// Counters for the designated-controller channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpConnectionStats {
    /// Connections established.
    pub connection_events: u32,
    /// Health-check timeouts observed.
    pub unhealthy_events: u32,
}

/// Heartbeat scheduling and silence detection for one connection.
pub struct HealthMonitor {
    heartbeat_interval: Duration,
    missed_limit: u32,
    last_rx: Instant,
    timed_out: bool,
    on_timeout: Option<Box<dyn FnOnce()>>,
    stats: TcpConnectionStats,
}

impl HealthMonitor {
    /// Create a monitor with the standard E1.33 parameters.
    pub fn new(now: Instant, on_timeout: Box<dyn FnOnce()>) -> Self {
        Self::with_parameters(
            now,
            E133_HEARTBEAT_INTERVAL,
            E133_MISSED_HEARTBEAT_LIMIT,
            on_timeout,
        )
    }

    pub fn with_parameters(
        now: Instant,
        heartbeat_interval: Duration,
        missed_limit: u32,
        on_timeout: Box<dyn FnOnce()>,
    ) -> Self {
        HealthMonitor {
            heartbeat_interval,
            missed_limit,
            last_rx: now,
            timed_out: false,
            on_timeout: Some(on_timeout),
            stats: TcpConnectionStats {
                connection_events: 1,
                unhealthy_events: 0,
            },
        }
    }

    /// The cadence the owner should drive [`Self::tick`] at.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Any ACN PDU arrived on this connection; reset the silence countdown.
    pub fn pdu_received(&mut self, now: Instant) {
        self.last_rx = now;
    }

    /// Heartbeat timer fired.
    ///
    /// Returns true when the owner should send a heartbeat packet. Once the
    /// silence budget is exhausted the timeout callback runs (exactly once)
    /// and the monitor goes quiet.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.timed_out {
            return false;
        }
        let budget = self.heartbeat_interval * self.missed_limit;
        if now.saturating_duration_since(self.last_rx) >= budget {
            log::info!(
                "[E133] no traffic for {:?}, closing connection",
                budget
            );
            self.timed_out = true;
            self.stats.unhealthy_events += 1;
            if let Some(on_timeout) = self.on_timeout.take() {
                on_timeout();
            }
            return false;
        }
        true
    }

    /// True once the timeout callback has fired.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn stats(&self) -> TcpConnectionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn monitor(now: Instant) -> (HealthMonitor, Rc<Cell<u32>>) {
        let fired = Rc::new(Cell::new(0));
        let hit = Rc::clone(&fired);
        let monitor = HealthMonitor::with_parameters(
            now,
            Duration::from_secs(2),
            3,
            Box::new(move || hit.set(hit.get() + 1)),
        );
        (monitor, fired)
    }

    #[test]
    fn test_three_silent_intervals_time_out_once() {
        let now = Instant::now();
        let (mut monitor, fired) = monitor(now);

        assert!(monitor.tick(now + Duration::from_secs(2)));
        assert!(monitor.tick(now + Duration::from_secs(4)));
        assert!(!monitor.tick(now + Duration::from_secs(6)));
        assert_eq!(fired.get(), 1);
        assert!(monitor.timed_out());

        // Further ticks stay quiet.
        assert!(!monitor.tick(now + Duration::from_secs(8)));
        assert_eq!(fired.get(), 1);
        assert_eq!(monitor.stats().unhealthy_events, 1);
    }

    #[test]
    fn test_received_pdu_resets_countdown() {
        let now = Instant::now();
        let (mut monitor, fired) = monitor(now);

        assert!(monitor.tick(now + Duration::from_secs(2)));
        assert!(monitor.tick(now + Duration::from_secs(4)));
        monitor.pdu_received(now + Duration::from_secs(5));
        assert!(monitor.tick(now + Duration::from_secs(6)));
        assert!(monitor.tick(now + Duration::from_secs(8)));
        assert!(monitor.tick(now + Duration::from_secs(10)));
        assert_eq!(fired.get(), 0);

        assert!(!monitor.tick(now + Duration::from_secs(11)));
        assert_eq!(fired.get(), 1);
    }
}
