//! Per-session keepalive heartbeat.
//!
//! One timer per session, fixed period. Each tick checks whether the
//! client responded (pong) since the previous tick: if not, the session
//! is unresponsive; otherwise the flag is cleared and a ping goes out.
//! One missed cycle triggers termination, so detection latency is at
//! most two periods.

use std::time::Duration;

use tokio::time::{self, Instant, Interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveTick {
    /// Client was alive this cycle; send a ping and keep going
    Ping,
    /// No pong since the previous tick
    Unresponsive,
}

pub struct Keepalive {
    interval: Interval,
    alive: bool,
}

impl Keepalive {
    pub fn new(period: Duration) -> Self {
        // First tick fires one full period after start, not immediately
        let interval = time::interval_at(Instant::now() + period, period);
        Self {
            interval,
            alive: true,
        }
    }

    /// Wait for the next timer tick and report the cycle outcome.
    pub async fn tick(&mut self) -> KeepaliveTick {
        self.interval.tick().await;
        if self.alive {
            self.alive = false;
            KeepaliveTick::Ping
        } else {
            KeepaliveTick::Unresponsive
        }
    }

    /// Record a pong from the client.
    pub fn mark_alive(&mut self) {
        self.alive = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_tick_pings_after_one_period() {
        let mut keepalive = Keepalive::new(Duration::from_secs(30));
        let before = Instant::now();
        assert_eq!(keepalive.tick().await, KeepaliveTick::Ping);
        assert!(before.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_is_unresponsive_on_second_tick() {
        let mut keepalive = Keepalive::new(Duration::from_secs(30));
        assert_eq!(keepalive.tick().await, KeepaliveTick::Ping);
        assert_eq!(keepalive.tick().await, KeepaliveTick::Unresponsive);
    }

    #[tokio::test(start_paused = true)]
    async fn pong_between_ticks_keeps_session_alive() {
        let mut keepalive = Keepalive::new(Duration::from_secs(30));
        for _ in 0..5 {
            assert_eq!(keepalive.tick().await, KeepaliveTick::Ping);
            keepalive.mark_alive();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn detection_latency_is_at_most_two_periods() {
        let mut keepalive = Keepalive::new(Duration::from_secs(30));
        let start = Instant::now();
        assert_eq!(keepalive.tick().await, KeepaliveTick::Ping);
        assert_eq!(keepalive.tick().await, KeepaliveTick::Unresponsive);
        assert!(start.elapsed() <= Duration::from_secs(61));
    }
}
